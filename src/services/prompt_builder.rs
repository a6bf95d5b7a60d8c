//! 评分提示词构建 - 业务能力层
//!
//! 纯函数：相同输入必然得到字节级相同的提示词。
//! 切换 `QuotingMode` 只改变引用说明段，不影响对话渲染和 JSON 结构说明。

use std::fmt::Write;

use crate::models::{Conversation, QuotingMode, Rubric};

const RESPONSE_SCHEMA: &str = r#"You MUST provide your response as a valid JSON object with the following structure:
{
    "grade": <your grade value>,
    "quotes": [
        {
            "message_index": <index of the message (0-based, as shown in [Message N] above)>,
            "start": <start character position in the message content (0-based)>,
            "end": <end character position in the message content (exclusive)>,
            "text": "<the exact quoted text - must be a verbatim substring>"
        }
    ],
    "explanation": "<your explanation for the grade, referencing the quotes>"
}"#;

const QUOTES_OPTIONAL: &str = r#"## Quoting Instructions (Optional)

You may optionally include quotes that support your grade. If included:
1. **message_index**: The message number shown in brackets [Message N] - use N as the index
2. **text**: Copy the EXACT substring from the message content
3. **start**: The character position where your quoted text begins (0-based)
4. **end**: The character position where your quoted text ends (exclusive)

If you don't want to include quotes, leave the "quotes" array empty: "quotes": []"#;

const QUOTES_REQUIRED: &str = r#"## Quoting Instructions (REQUIRED)

You MUST include 1-5 quotes that support your grade. This is MANDATORY.
If you do not include quotes, your response will be rejected and you will be asked again.

For each quote:
1. **message_index**: The message number shown in brackets [Message N] - use N as the index
2. **text**: Copy the EXACT substring from the message content - character for character, including any whitespace or punctuation
3. **start**: The character position where your quoted text begins in that message's content (0 = first character)
4. **end**: The character position where your quoted text ends (exclusive, so end - start = length of text)

Example: If message content is "Hello world!" and you want to quote "world", then start=6, end=11, text="world"

IMPORTANT: The "quotes" array MUST NOT be empty. Include at least one quote."#;

const QUOTES_REQUIRED_RETRY: &str = r#"## Quoting Instructions (REQUIRED - RETRY ATTEMPT)

**YOUR PREVIOUS RESPONSE WAS REJECTED BECAUSE IT DID NOT INCLUDE QUOTES.**

You MUST include at least 1 quote. This is ABSOLUTELY MANDATORY - your response will be rejected again if you don't include quotes.

The "quotes" array in your JSON response MUST contain at least one quote object.

For each quote:
1. **message_index**: The message number shown in brackets [Message N] - use N as the index
2. **text**: Copy the EXACT substring from the message content
3. **start**: Character position where the quote begins (0 = first character)
4. **end**: Character position where the quote ends (exclusive)

Example: {"message_index": 0, "start": 0, "end": 5, "text": "Hello"}

DO NOT return an empty quotes array. Include at least one relevant quote from the conversation."#;

/// 引用说明段
pub fn quoting_instructions(mode: QuotingMode) -> &'static str {
    match mode {
        QuotingMode::Optional => QUOTES_OPTIONAL,
        QuotingMode::Required => QUOTES_REQUIRED,
        QuotingMode::RequiredRetry => QUOTES_REQUIRED_RETRY,
    }
}

/// 渲染对话：每条消息带 `[Message N] (role):` 标签，内容原样保留
pub fn render_conversation(conversation: &Conversation) -> String {
    let mut text = String::new();
    for (i, msg) in conversation.messages.iter().enumerate() {
        let _ = write!(text, "[Message {}] ({}):\n{}\n\n", i, msg.role, msg.content);
    }
    text
}

/// 构建完整的评分提示词
pub fn build_grading_prompt(
    conversation: &Conversation,
    rubric: &Rubric,
    mode: QuotingMode,
) -> String {
    format!(
        r#"You are an expert evaluator. Your task is to grade the following conversation based on the specified metric.

## Conversation to Evaluate

{conversation}

## Grading Metric

{metric}

## Instructions

{grade_instruction}

{schema}

{quote_section}

Respond ONLY with the JSON object, no additional text."#,
        conversation = render_conversation(conversation),
        metric = rubric.prompt,
        grade_instruction = rubric.grade_type.instruction(),
        schema = RESPONSE_SCHEMA,
        quote_section = quoting_instructions(mode),
    )
}
