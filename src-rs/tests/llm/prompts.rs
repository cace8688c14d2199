use crate::llm::prompts::{analyze_code, explain_function, find_vulnerabilities, suggest_name};

#[cfg(test)]
mod tests {
    use super::*;

    const CODE: &str = "int __cdecl main(int argc) { return argc; }";

    #[test]
    fn analyze_code_uses_builtin_instruction() {
        let prompt = analyze_code(CODE, None);
        assert!(prompt.starts_with("Analyze this decompiled code:"));
        assert!(prompt.ends_with(&format!("```c\n{}\n```", CODE)));
    }

    #[test]
    fn analyze_code_prefers_non_empty_custom_prompt() {
        assert_eq!(
            analyze_code(CODE, Some("Find the crypto constants.")),
            format!("Find the crypto constants.\n\n```c\n{}\n```", CODE)
        );
        assert_eq!(analyze_code(CODE, Some("")), analyze_code(CODE, None));
    }

    #[test]
    fn helpers_embed_code_after_instruction() {
        for prompt in [explain_function(CODE), find_vulnerabilities(CODE), suggest_name(CODE)] {
            let (instruction, fenced) = prompt.split_once("\n\n```c\n").unwrap();
            assert!(!instruction.is_empty());
            assert_eq!(fenced, format!("{}\n```", CODE));
        }
        assert!(find_vulnerabilities(CODE).contains("Use-after-free"));
    }
}
