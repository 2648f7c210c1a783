/// Consultant prompt with the format instructions bound once up front.
#[derive(Debug, Clone)]
pub struct ConsultPrompt {
    format_instructions: String,
}

impl ConsultPrompt {
    pub fn new(format_instructions: impl Into<String>) -> Self {
        Self {
            format_instructions: format_instructions.into(),
        }
    }

    pub fn format_instructions(&self) -> &str {
        &self.format_instructions
    }

    pub fn render(&self, title: &str, detail: &str) -> String {
        render_prompt(title, detail, &self.format_instructions)
    }
}

pub fn render_prompt(title: &str, detail: &str, format_instructions: &str) -> String {
    format!(
        "あなたは優秀なコンサルタントです。\n\
        以下の課題について、解決策、類似ケース、費用相場を提案してください。\n\
        \n\
        {format_instructions}\n\
        \n\
        # 課題\n\
        ## タイトル\n\
        {title}\n\
        \n\
        ## 詳細\n\
        {detail}\n"
    )
}
