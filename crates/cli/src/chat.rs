use fadvisor_core::advisor::Advisor;
use fadvisor_core::llm::ChatMessage;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

const WELCOME: &str = "\
============================================================
Welcome to FAdvisor - Your AI Financial Assistant
============================================================
I can help you with:
- Stock analysis and recommendations
- Market trends and conditions
- Portfolio analysis and optimization
- Investment strategies and education

Type 'help' for commands or 'quit' to exit
";

const HELP: &str = "\
Available commands:
- Ask any investment question
- 'analyze SYMBOL' - Analyze a specific stock
- 'market' - Get market overview
- 'help' - Show this help message
- 'quit' or 'exit' - Exit the application
";

#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Quit,
    Help,
    Blank,
    Query(String),
}

pub fn classify(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Blank;
    }
    match line.to_ascii_lowercase().as_str() {
        "quit" | "exit" => Input::Quit,
        "help" => Input::Help,
        _ => Input::Query(line.to_string()),
    }
}

/// Interactive loop until `quit`/`exit` or end of input. Advisor errors are
/// printed and the session continues.
pub async fn run<R, W>(advisor: &Advisor, reader: R, mut out: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut history: Vec<ChatMessage> = Vec::new();

    out.write_all(WELCOME.as_bytes()).await?;
    out.write_all(format!("Using model: {}\n", advisor.model()).as_bytes()).await?;

    loop {
        out.write_all(b"\nYou: ").await?;
        out.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match classify(&line) {
            Input::Quit => {
                out.write_all(b"\nThank you for using FAdvisor. Goodbye!\n").await?;
                break;
            }
            Input::Help => out.write_all(HELP.as_bytes()).await?,
            Input::Blank => continue,
            Input::Query(query) => {
                out.write_all(b"\nFAdvisor: Analyzing...\n\n").await?;
                match advisor.ask(&history, &query).await {
                    Ok(reply) => {
                        out.write_all(reply.as_bytes()).await?;
                        out.write_all(b"\n").await?;
                        history.push(ChatMessage::user(query));
                        history.push(ChatMessage::assistant(reply));
                    }
                    Err(err) => {
                        tracing::error!(error = %format!("{err:#}"), "query failed");
                        out.write_all(format!("Error: {err:#}\n").as_bytes()).await?;
                    }
                }
            }
        }
    }

    out.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fadvisor_core::config::PortfolioSettings;
    use fadvisor_core::domain::{Interval, Period, PriceSeries, TickerSnapshot};
    use fadvisor_core::error::AnalysisError;
    use fadvisor_core::llm::{LlmClient, Provider, ToolExecutor, ToolSpec};
    use fadvisor_core::market::MarketDataProvider;
    use fadvisor_core::tools::Toolbox;
    use std::sync::Arc;

    struct NoMarket;

    #[async_trait::async_trait]
    impl MarketDataProvider for NoMarket {
        fn provider_name(&self) -> &'static str {
            "none"
        }

        async fn get_snapshot(&self, symbol: &str) -> Result<TickerSnapshot, AnalysisError> {
            Err(AnalysisError::unavailable(symbol, "offline"))
        }

        async fn get_price_series(&self, symbol: &str, _: Period, _: Interval) -> Result<PriceSeries, AnalysisError> {
            Err(AnalysisError::unavailable(symbol, "offline"))
        }
    }

    /// Replies with the history length; fails on "boom".
    struct CountingLlm;

    #[async_trait::async_trait]
    impl LlmClient for CountingLlm {
        fn provider(&self) -> Provider {
            Provider::OpenRouter
        }

        fn model(&self) -> &str {
            "counting"
        }

        async fn respond(
            &self,
            conversation: &[ChatMessage],
            _tools: &[ToolSpec],
            _executor: &dyn ToolExecutor,
        ) -> anyhow::Result<String> {
            let last = conversation.last().map(|m| m.content.as_str()).unwrap_or_default();
            anyhow::ensure!(last != "boom", "model exploded");
            Ok(format!("reply #{}", conversation.len()))
        }
    }

    fn advisor() -> Advisor {
        let toolbox = Toolbox::new(Arc::new(NoMarket), &PortfolioSettings::default()).unwrap();
        Advisor::new(Arc::new(CountingLlm), toolbox)
    }

    #[test]
    fn classifies_commands() {
        assert_eq!(classify("  QUIT "), Input::Quit);
        assert_eq!(classify("exit"), Input::Quit);
        assert_eq!(classify("Help"), Input::Help);
        assert_eq!(classify("   "), Input::Blank);
        assert_eq!(classify(" how is AAPL? "), Input::Query("how is AAPL?".to_string()));
    }

    #[tokio::test]
    async fn session_keeps_history_and_survives_errors() {
        let input: &[u8] = b"first\n\nboom\nhelp\nsecond\nquit\nnever\n";
        let mut out = Vec::new();
        run(&advisor(), input, &mut out).await.unwrap();
        let out = String::from_utf8(out).unwrap();

        // system + user
        assert!(out.contains("reply #2"));
        assert!(out.contains("Error: model exploded"));
        assert!(out.contains("Available commands:"));
        // system + 2 history + user; the failed turn is not remembered
        assert!(out.contains("reply #4"));
        assert!(out.contains("Goodbye!"));
        assert!(!out.contains("reply #6"));
    }

    #[tokio::test]
    async fn end_of_input_ends_session() {
        let input: &[u8] = b"hello";
        let mut out = Vec::new();
        run(&advisor(), input, &mut out).await.unwrap();
        assert!(String::from_utf8(out).unwrap().contains("reply #2"));
    }
}
