use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;

const CONFIG_TEMPLATE: &str = r#"# qs configuration
#
# Every key below shows its default. Any key can also be set through the
# environment: QS_<SECTION>__<KEY>, e.g. QS_CHAT__API_KEY or
# QS_SEARCH__QIHOO__API_KEY.

# ── Chat endpoint ────────────────────────────────────────────────
[chat]
api_key = "EMPTY"
# One or more OpenAI-compatible servers. `qs batch` splits its questions
# across all of them.
base_urls = ["http://localhost:8000/v1"]
# model = "Qwen2.5-72B-Instruct"   # defaults to the first model the server lists

[chat.stream]
max_tokens = 2048
temperature = 0.7
frequency_penalty = 1.05

[chat.plain]
max_tokens = 1024
temperature = 0.7
frequency_penalty = 0.7

# ── Web search ───────────────────────────────────────────────────
[search]
provider = "qihoo"                # or "bing"
topk = 6
blacklist = ["enoN", "youtube.com", "bilibili.com", "researchgate.net"]
max_retry = 3
backoff_secs = [2, 5]
timeout_secs = 10
cache_ttl_secs = 600
cache_capacity = 100

[search.qihoo]
# api_key = "..."
# key = "..."                     # request signing key
cid = "saas_360zhengqi"

[search.bing]
# api_key = "..."
market = "zh-CN"

# ── Page fetching ────────────────────────────────────────────────
[fetch]
timeout_secs = 5
max_chars = 2048
cache_ttl_secs = 600
cache_capacity = 100

# ── Agents ───────────────────────────────────────────────────────
[agent]
planner_max_turns = 4
searcher_max_turns = 3
few_shot = true
tool_concurrency = 8
"#;

pub fn run() -> Result<()> {
    let config_dir = Config::config_dir()?;
    let config_path = config_dir.join("config.toml");

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;

    if config_path.exists() {
        println!("Existing config file found:\n  {}", config_path.display());
        print!("\nOverwrite? (The existing file will be backed up) [y/N] ");

        use std::io::Write;
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Setup cancelled.");
            return Ok(());
        }
        backup_file(&config_path)?;
    }

    write_template(&config_path)?;
    println!("Created {}", config_path.display());

    println!("\nNext steps:");
    println!("  1. Set your search key:  export QS_SEARCH__QIHOO__API_KEY=\"...\"");
    println!("  2. Point chat.base_urls at your model server");
    println!("  3. Ask something:        qs ask \"2024年诺贝尔物理学奖得主是谁？\"");

    Ok(())
}

fn write_template(path: &Path) -> Result<()> {
    std::fs::write(path, CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Back up a file to <name>.bak, appending a timestamp if .bak already exists.
fn backup_file(path: &Path) -> Result<()> {
    let mut backup = path.with_extension("toml.bak");

    if backup.exists() {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        backup = path.with_extension(format!("toml.bak.{timestamp}"));
    }

    std::fs::rename(path, &backup)
        .with_context(|| format!("Failed to back up {} to {}", path.display(), backup.display()))?;
    println!("  Backed up to {}", backup.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_matches_defaults() {
        let config: Config = toml::from_str(CONFIG_TEMPLATE).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_backup_then_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "old = true\n").unwrap();

        backup_file(&path).unwrap();
        write_template(&path).unwrap();

        let backup = dir.path().join("config.toml.bak");
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "old = true\n");
        assert!(Config::load_from(&path).is_ok());
    }
}
