//! Prompt text for the reverse-engineering helpers. Decompiled code is
//! always embedded in a ```c fence.

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert reverse engineer assisting with \
IDA Pro analysis. Answer precisely and concisely, referring to the decompiled code you are given.";

const ANALYZE_CODE: &str = "Analyze this decompiled code:\n\
1. What does the function do?\n\
2. Key variables and their purpose\n\
3. Suspicious or interesting patterns\n\
4. Suggested names for variables/functions";

const EXPLAIN_FUNCTION: &str = "Explain what this function does. Be concise.";

const FIND_VULNERABILITIES: &str = "Analyze for security vulnerabilities:\n\
- Buffer overflows\n\
- Integer overflows\n\
- Format string bugs\n\
- Use-after-free\n\
- Memory leaks\n\
- Command/SQL injection\n\
- Path traversal";

const SUGGEST_NAME: &str =
    "Suggest a descriptive function name based on this code. Reply with just the name.";

fn with_code(instruction: &str, code: &str) -> String {
    format!("{}\n\n```c\n{}\n```", instruction, code)
}

/// Uses `custom_prompt` as the instruction when it is non-empty.
pub fn analyze_code(code: &str, custom_prompt: Option<&str>) -> String {
    match custom_prompt.filter(|p| !p.is_empty()) {
        Some(prompt) => with_code(prompt, code),
        None => with_code(ANALYZE_CODE, code),
    }
}

pub fn explain_function(pseudocode: &str) -> String {
    with_code(EXPLAIN_FUNCTION, pseudocode)
}

pub fn find_vulnerabilities(code: &str) -> String {
    with_code(FIND_VULNERABILITIES, code)
}

pub fn suggest_name(pseudocode: &str) -> String {
    with_code(SUGGEST_NAME, pseudocode)
}
