//! Prompt templates, one per model call site.
//!
//! Every builder takes the current history by reference and returns a fresh
//! message list; the caller's history is never touched.

use chrono::{Local, NaiveDate};

use qs_core::Message;

pub(crate) const THOUGHT_PROMPT: &str = r###"你是一个负责规划检索的研究助手。你的任务是判断回答用户问题还缺少哪些信息，并把缺少的部分拆成可以直接交给搜索引擎的子问题。

## 工作方式
1. 阅读对话中的用户问题以及已经得到的检索结果（以"##当前问题:"开头的内容）。
2. 如果现有信息还不足以回答，列出下一步需要检索的子问题。每个子问题应当独立、具体，可以单独搜索。
3. 如果现有信息已经足够，或者问题不需要检索，"search" 返回空列表。

## 输出格式
只输出一个 JSON 对象，不要输出其他内容：
{"thought": "你的分析", "search": ["子问题1", "子问题2"]}"###;

pub(crate) const THOUGHT_FEW_SHOT: &str = r###"## 示例
用户问题: 2022年世界杯冠军队的主教练是谁？他出生在哪一年？
输出: {"thought": "需要先确认2022年世界杯冠军，再查询该队主教练及其出生年份。", "search": ["2022年世界杯冠军是哪支球队", "2022年世界杯冠军队主教练"]}

用户问题: 1+1等于几？
输出: {"thought": "这是常识问题，不需要检索。", "search": []}"###;

pub(crate) const SEARCH_TOOL_PROMPT: &str = r###"当前日期: {current_date}

你是一个检索助手，需要为"## 当前问题"生成搜索关键词。你可以调用下面的工具：
{tool_info}

## 要求
- 关键词要简洁，包含问题中的关键实体和限定条件。
- 可以给出多个关键词，从不同角度覆盖问题。
- 涉及时间的问题请结合当前日期。

## 输出格式
只输出一个 JSON 对象：
{"name": "web_search", "parameters": {"query": ["关键词1", "关键词2"]}}"###;

pub(crate) const SEARCH_FEW_SHOT: &str = r###"## 示例
当前问题: 今年诺贝尔物理学奖得主是谁？
输出: {"name": "web_search", "parameters": {"query": ["诺贝尔物理学奖 得主", "诺贝尔物理学奖 获奖者 名单"]}}"###;

pub(crate) const SELECT_TOOL_PROMPT: &str = r###"你是一个检索助手。上面给出了搜索结果，每条结果有编号、url、title 和 snippet。请挑选最可能包含"## 当前问题"答案的网页，系统会读取它们的正文。你可以调用下面的工具：
{tool_info}

## 要求
- 只选择与问题直接相关的结果，优先选择权威来源。
- 最多选择3条。

## 输出格式
只输出一个 JSON 对象：
{"name": "web_select", "parameters": {"select_ids": ["0", "2"]}}"###;

pub(crate) const SELECT_FEW_SHOT: &str = r###"## 示例
搜索结果: {"0": {"url": "https://www.nobelprize.org/...", "title": "物理学奖", "snippet": "..."}, "1": {"url": "https://example.com/ad", "title": "广告", "snippet": "..."}}
输出: {"name": "web_select", "parameters": {"select_ids": ["0"]}}"###;

pub(crate) const SUFFICIENCY_PROMPT: &str = r###"请判断以上信息是否已经足够回答"## 当前问题"。
- 信息足够时 action 为 "True"。
- 信息不足、需要继续检索时 action 为 "False"。

只输出一个 JSON 对象：
{"thought": "你的判断依据", "action": "True"}"###;

pub(crate) const SUFFICIENCY_FEW_SHOT: &str = r###"## 示例
当前问题: 珠穆朗玛峰有多高？（尚无检索结果）
输出: {"thought": "还没有任何检索结果，无法确认最新测量数据。", "action": "False"}

当前问题: 珠穆朗玛峰有多高？（检索结果显示2020年测得8848.86米）
输出: {"thought": "检索结果已经给出高度。", "action": "True"}"###;

pub(crate) const SUMMARY_PROMPT: &str = r###"你是一个研究助手。请根据对话中的全部检索结果，回答用户最初的问题。

## 要求
- 直接给出答案，再简要说明依据。
- 只使用检索结果中能够确认的信息；信息之间有冲突时指出冲突。
- 如果检索结果无法回答问题，如实说明。
- 使用与用户问题相同的语言作答。"###;

fn with_examples(instruction: &str, examples: &str, few_shot: bool) -> String {
    if few_shot {
        format!("{instruction}\n{examples}")
    } else {
        instruction.to_string()
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Planner round: date, planning instruction, then the history.
pub fn thought_prompt(history: &[Message], few_shot: bool) -> Vec<Message> {
    thought_prompt_on(today(), history, few_shot)
}

pub(crate) fn thought_prompt_on(date: NaiveDate, history: &[Message], few_shot: bool) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(format!(
        "The current date is {}.",
        date.format("%Y-%m-%d")
    )));
    messages.push(Message::system(with_examples(
        THOUGHT_PROMPT,
        THOUGHT_FEW_SHOT,
        few_shot,
    )));
    messages.extend_from_slice(history);
    messages
}

/// Searcher keyword round, with the `web_search` schema in `tool_info`.
pub fn search_prompt(history: &[Message], tool_info: &str, few_shot: bool) -> Vec<Message> {
    search_prompt_on(today(), history, tool_info, few_shot)
}

pub(crate) fn search_prompt_on(
    date: NaiveDate,
    history: &[Message],
    tool_info: &str,
    few_shot: bool,
) -> Vec<Message> {
    let system = SEARCH_TOOL_PROMPT
        .replace("{current_date}", &date.format("%Y-%m-%d").to_string())
        .replace("{tool_info}", tool_info);

    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(Message::system(with_examples(&system, SEARCH_FEW_SHOT, few_shot)));
    messages.extend_from_slice(history);
    messages
}

/// Searcher page-selection round.
///
/// The second-to-last message of the assembled list is dropped. With the
/// usual history shape that is the assistant's search call sitting right
/// before the search results it produced.
pub fn select_prompt(history: &[Message], tool_info: &str, few_shot: bool) -> Vec<Message> {
    let system = SELECT_TOOL_PROMPT.replace("{tool_info}", tool_info);

    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(Message::system(with_examples(&system, SELECT_FEW_SHOT, few_shot)));
    messages.extend_from_slice(history);
    if messages.len() >= 2 {
        messages.remove(messages.len() - 2);
    }
    messages
}

/// Ask whether the history already answers the sub-query.
pub fn sufficiency_prompt(history: &[Message], few_shot: bool) -> Vec<Message> {
    let mut messages = history.to_vec();
    messages.push(Message::user(with_examples(
        SUFFICIENCY_PROMPT,
        SUFFICIENCY_FEW_SHOT,
        few_shot,
    )));
    messages
}

pub fn summary_prompt(history: &[Message]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(Message::system(SUMMARY_PROMPT));
    messages.extend_from_slice(history);
    messages
}
