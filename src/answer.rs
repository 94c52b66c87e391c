//! Grounded answer generation with a refusal policy.
//!
//! The gate renders a prompt from the evidence, calls the generator under a
//! timeout, and replaces degenerate output with [`REFUSAL`]. Citations are
//! those of the context that was actually supplied, refusal or not.
//!
//! The word-count check is a coarse proxy for "the model produced a
//! non-answer"; `generation.minimum_answer_words` tunes it.

use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::GenerationError;
use crate::generate::{GenerationRequest, Generator};
use crate::models::{Answer, ContextBlock};

/// The canonical insufficient-evidence answer. Callers may match on it.
pub const REFUSAL: &str = "Insufficient evidence in the provided documents.";

/// Prompt wording selected by `[context].template`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    /// Describe how a concept is operationalized or used empirically.
    Research,
    /// State supported facts without attributing them to authors.
    Facts,
}

impl PromptTemplate {
    pub fn from_name(name: &str) -> Self {
        match name {
            "facts" => PromptTemplate::Facts,
            _ => PromptTemplate::Research,
        }
    }

    pub fn render(&self, question: &str, context: &str) -> String {
        let (role, task) = match self {
            PromptTemplate::Research => (
                "You are a quantitative finance research assistant.",
                "- Describe how the concept is operationalized or empirically used in the papers",
            ),
            PromptTemplate::Facts => (
                "You extract facts from quantitative finance research excerpts.",
                "- State only facts the excerpts support, without attributing them to authors",
            ),
        };

        format!(
            "{role}\n\n\
             CONTEXT (verbatim excerpts from academic papers):\n{context}\n\n\
             QUESTION:\n{question}\n\n\
             ANSWER INSTRUCTIONS:\n\
             - Use ONLY the context above\n\
             {task}\n\
             - Do NOT give generic or textbook definitions\n\
             - Do NOT speculate or generalize\n\
             - If the context does not explicitly explain the concept, respond EXACTLY with:\n  \
             \"{refusal}\"\n\n\
             ANSWER:\n",
            role = role,
            context = context,
            question = question,
            task = task,
            refusal = REFUSAL,
        )
    }
}

/// Wraps a [`Generator`] with prompting, a timeout, and the refusal policy.
pub struct AnswerGate {
    generator: Arc<dyn Generator>,
    template: PromptTemplate,
    minimum_answer_words: usize,
    temperature: f32,
    max_tokens: usize,
    timeout: Duration,
}

impl AnswerGate {
    pub fn new(
        generator: Arc<dyn Generator>,
        config: &GenerationConfig,
        template: PromptTemplate,
    ) -> Self {
        Self {
            generator,
            template,
            minimum_answer_words: config.minimum_answer_words,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Answer `question` from `context`.
    ///
    /// An empty context is refused without calling the generator. Backend
    /// failures and timeouts are errors, never refusals.
    pub async fn answer(
        &self,
        question: &str,
        context: &ContextBlock,
    ) -> Result<Answer, GenerationError> {
        if context.is_empty() {
            tracing::debug!("empty context, refusing without generation");
            return Ok(refusal(Vec::new()));
        }

        let prompt = self.template.render(question, &context.text);
        let request = GenerationRequest {
            prompt: &prompt,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let output = tokio::time::timeout(self.timeout, self.generator.generate(&request))
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout.as_secs()))??;

        let text = output.trim();
        let words = text.split_whitespace().count();
        if words < self.minimum_answer_words || text.trim_matches('"').trim() == REFUSAL {
            tracing::info!(words, generator = self.generator.name(), "answer refused");
            return Ok(refusal(context.citations.clone()));
        }

        Ok(Answer {
            text: text.to_string(),
            citations: context.citations.clone(),
            refused: false,
        })
    }
}

fn refusal(citations: Vec<crate::models::Provenance>) -> Answer {
    Answer {
        text: REFUSAL.to_string(),
        citations,
        refused: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provenance;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies with a fixed string and records the prompts it saw.
    struct Scripted {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Generator for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn generate(
            &self,
            request: &GenerationRequest<'_>,
        ) -> Result<String, GenerationError> {
            self.prompts
                .lock()
                .unwrap()
                .push(request.prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    struct Slow;

    #[async_trait]
    impl Generator for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        async fn generate(
            &self,
            _request: &GenerationRequest<'_>,
        ) -> Result<String, GenerationError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("too late".into())
        }
    }

    fn context() -> ContextBlock {
        ContextBlock {
            text: "GARCH(1,1) is estimated on daily S&P 500 returns to measure persistence.".into(),
            citations: vec![Provenance {
                source: "garch.pdf".into(),
                domain: "volatility".into(),
                page: 4,
            }],
        }
    }

    fn gate(generator: Arc<dyn Generator>) -> AnswerGate {
        AnswerGate::new(
            generator,
            &GenerationConfig::default(),
            PromptTemplate::Research,
        )
    }

    #[tokio::test]
    async fn substantive_answer_passes_with_citations() {
        let generator = Scripted::new(
            "  The papers estimate GARCH(1,1) on daily returns to gauge persistence.  ",
        );
        let answer = gate(generator.clone())
            .answer("How is GARCH used?", &context())
            .await
            .unwrap();
        assert!(!answer.refused);
        assert!(answer.text.starts_with("The papers"));
        assert_eq!(answer.citations, context().citations);

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("Use ONLY the context above"));
        assert!(prompts[0].contains(REFUSAL));
        assert!(prompts[0].contains("How is GARCH used?"));
        assert!(prompts[0].contains(&context().text));
    }

    #[tokio::test]
    async fn short_output_becomes_refusal_but_keeps_citations() {
        let answer = gate(Scripted::new("I am not sure."))
            .answer("What is XYZ?", &context())
            .await
            .unwrap();
        assert!(answer.refused);
        assert_eq!(answer.text, REFUSAL);
        assert_eq!(answer.citations.len(), 1);
    }

    #[tokio::test]
    async fn verbatim_refusal_is_flagged() {
        let quoted = format!("\"{}\"", REFUSAL);
        let answer = gate(Scripted::new(&quoted))
            .answer("q", &context())
            .await
            .unwrap();
        assert!(answer.refused);
        assert_eq!(answer.text, REFUSAL);
    }

    #[tokio::test]
    async fn quotes_in_a_real_answer_are_kept() {
        let reply = "Crashes follow rebounds; the papers call this a \"momentum crash\"";
        let answer = gate(Scripted::new(reply))
            .answer("q", &context())
            .await
            .unwrap();
        assert!(!answer.refused);
        assert_eq!(answer.text, reply);
    }

    #[tokio::test]
    async fn empty_context_skips_generator() {
        let generator = Scripted::new("a long and confident answer that should never be produced");
        let answer = gate(generator.clone())
            .answer("q", &ContextBlock::default())
            .await
            .unwrap();
        assert!(answer.refused);
        assert!(answer.citations.is_empty());
        assert!(generator.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn threshold_is_configurable() {
        let cfg = GenerationConfig {
            minimum_answer_words: 2,
            ..Default::default()
        };
        let answer = AnswerGate::new(Scripted::new("Twelve months."), &cfg, PromptTemplate::Facts)
            .answer("q", &context())
            .await
            .unwrap();
        assert!(!answer.refused);
    }

    #[tokio::test]
    async fn timeout_is_an_error_not_a_refusal() {
        let result = gate(Arc::new(Slow))
            .with_timeout(Duration::from_millis(50))
            .answer("q", &context())
            .await;
        assert!(matches!(result, Err(GenerationError::Timeout(_))));
    }

    #[tokio::test]
    async fn disabled_backend_error_propagates() {
        let result = gate(Arc::new(crate::generate::DisabledGenerator))
            .answer("q", &context())
            .await;
        assert!(matches!(result, Err(GenerationError::Disabled)));
    }

    #[test]
    fn templates_differ_in_task_only() {
        let research = PromptTemplate::Research.render("q", "ctx");
        let facts = PromptTemplate::from_name("facts").render("q", "ctx");
        assert_ne!(research, facts);
        for prompt in [&research, &facts] {
            assert!(prompt.contains("Do NOT speculate"));
            assert!(prompt.contains("textbook definitions"));
            assert!(prompt.ends_with("ANSWER:\n"));
        }
        assert!(research.contains("operationalized"));
        assert!(facts.contains("attributing"));
    }
}
