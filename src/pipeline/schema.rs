/// One named field the model is asked to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub type_hint: &'static str,
}

pub const CONSULTING_SCHEMAS: [ResponseSchema; 3] = [
    ResponseSchema {
        name: "solution_proposals",
        description: "考えられる解決策の提案をリスト形式で返します。",
        type_hint: "list[string]",
    },
    ResponseSchema {
        name: "similar_cases",
        description: "過去の類似ケースや事例をリスト形式で返します。",
        type_hint: "list[string]",
    },
    ResponseSchema {
        name: "cost_estimate",
        description: "解決にかかる費用の相場をリスト形式で返します。",
        type_hint: "list[string]",
    },
];

/// Describes the expected answer layout to the model: a fenced JSON snippet with
/// one line per field.
pub fn format_instructions(schemas: &[ResponseSchema]) -> String {
    let fields = schemas
        .iter()
        .map(|s| format!("\t\"{}\": {}  // {}", s.name, s.type_hint, s.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "The output should be a markdown code snippet formatted in the following schema, \
        including the leading and trailing \"```json\" and \"```\":\n\n\
        ```json\n{{\n{fields}\n}}\n```"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_field_order() {
        let names: Vec<&str> = CONSULTING_SCHEMAS.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec!["solution_proposals", "similar_cases", "cost_estimate"]
        );
    }

    #[test]
    fn test_format_instructions_lists_every_field() {
        let text = format_instructions(&CONSULTING_SCHEMAS);
        assert!(text.contains("```json\n{\n\t\"solution_proposals\": list[string]  // 考えられる解決策"));
        assert!(text.contains("\t\"similar_cases\": list[string]"));
        assert!(text.contains("\t\"cost_estimate\": list[string]"));
        assert!(text.ends_with("\n}\n```"));
    }

    #[test]
    fn test_format_instructions_deterministic() {
        assert_eq!(
            format_instructions(&CONSULTING_SCHEMAS),
            format_instructions(&CONSULTING_SCHEMAS)
        );
    }
}
