use crate::llm::{ChatMessage, LlmClient};
use crate::tools::Toolbox;
use std::sync::Arc;

pub const SYSTEM_PROMPT: &str = "\
You are FAdvisor, a financial advisory assistant that helps users make informed investment decisions.

Use the available tools to ground every answer in data:
- get_stock_info and analyze_technical for questions about a specific stock
- get_market_overview for market conditions and sentiment
- analyze_portfolio when the user lists holdings
- calculate_portfolio_allocation for asset allocation questions

Principles:
- Give balanced analysis that mentions both opportunities and risks.
- Support recommendations with the metrics the tools return.
- Explain financial concepts plainly.
- Remind users this is not personalized financial advice.";

/// Couples a language model with the tool surface.
#[derive(Clone)]
pub struct Advisor {
    llm: Arc<dyn LlmClient>,
    toolbox: Toolbox,
}

impl Advisor {
    pub fn new(llm: Arc<dyn LlmClient>, toolbox: Toolbox) -> Self {
        Self { llm, toolbox }
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    pub async fn ask(&self, history: &[ChatMessage], query: &str) -> anyhow::Result<String> {
        let mut conversation = Vec::with_capacity(history.len() + 2);
        conversation.push(ChatMessage::system(SYSTEM_PROMPT));
        conversation.extend_from_slice(history);
        conversation.push(ChatMessage::user(query));

        tracing::info!(model = self.llm.model(), history = history.len(), "advisor query");
        self.llm
            .respond(&conversation, &Toolbox::specs(), &self.toolbox)
            .await
    }
}
