//! Fan-Out/Synthesis Orchestrator
//!
//! Combined-analysis mode: the same assembled context goes to one branch
//! per provider family concurrently, all via the single-shot convention so
//! results are fully materialized before synthesis. Branches are isolated;
//! a failed branch contributes an empty labeled output instead of
//! cancelling the others. Synthesis runs exactly once, strictly after all
//! three branches settle, and its output is the sole response.

use std::sync::Arc;

use crate::context::AssembledContext;
use crate::deadline::Deadline;
use crate::envelope::ResponseEnvelope;
use crate::error::Result;
use crate::invoke::Invoker;
use crate::message::{Conversation, Message};
use crate::provider::{ProviderFamily, ProviderVariant};

/// The fixed branch set: one single-shot-driven variant per family
pub const FAN_OUT_BRANCHES: [(ProviderFamily, ProviderVariant); 3] = [
    (ProviderFamily::Gemini, ProviderVariant::GeminiFlash),
    (ProviderFamily::OpenAi, ProviderVariant::OpenAiStandard),
    (ProviderFamily::Perplexity, ProviderVariant::PerplexitySonar),
];

/// Orchestrator configuration
#[derive(Clone, Copy, Debug)]
pub struct FanOutConfig {
    /// Variant that runs the synthesis call
    pub synthesis_variant: ProviderVariant,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            synthesis_variant: ProviderVariant::OpenAiStandard,
        }
    }
}

/// One settled branch
#[derive(Clone, Debug)]
pub struct BranchOutput {
    pub family: ProviderFamily,
    /// Branch text; empty when the branch failed
    pub text: String,
    pub failed: bool,
}

/// The three settled branch outputs plus the synthesis output
#[derive(Clone, Debug)]
pub struct FanOutResult {
    pub branches: Vec<BranchOutput>,
    pub synthesis: String,
}

/// Drives combined-analysis requests
pub struct FanOutOrchestrator {
    invoker: Arc<Invoker>,
    config: FanOutConfig,
}

impl FanOutOrchestrator {
    pub fn new(invoker: Arc<Invoker>, config: FanOutConfig) -> Self {
        Self { invoker, config }
    }

    /// Run the full fan-out and return the synthesis output as a complete
    /// envelope. The branch outputs are synthesis input only, never shown
    /// to the end user directly.
    pub async fn run(
        &self,
        ctx: &AssembledContext,
        conversation: &Conversation,
        deadline: Deadline,
    ) -> Result<ResponseEnvelope> {
        let result = self.run_detailed(ctx, conversation, deadline).await?;
        Ok(ResponseEnvelope::Complete(result.synthesis))
    }

    /// Fan-out with the intermediate branch outputs exposed
    pub async fn run_detailed(
        &self,
        ctx: &AssembledContext,
        conversation: &Conversation,
        deadline: Deadline,
    ) -> Result<FanOutResult> {
        // Synthesis credential is checked before any branch launches, so a
        // misconfigured synthesis target fails fast without burning calls.
        self.invoker.credentials().require(self.config.synthesis_variant)?;

        let system = ctx.render();
        let question = conversation.last_user_text().unwrap_or_default().to_string();

        // Full-barrier join: synthesis construction never interleaves with
        // in-flight branch execution.
        let [(f0, v0), (f1, v1), (f2, v2)] = FAN_OUT_BRANCHES;
        let (a, b, c) = tokio::join!(
            self.branch(f0, v0, &system, conversation, deadline),
            self.branch(f1, v1, &system, conversation, deadline),
            self.branch(f2, v2, &system, conversation, deadline),
        );
        let branches = vec![a, b, c];

        if branches.iter().all(|b| b.failed) {
            // Deliberate leniency: synthesis still runs on empty inputs.
            tracing::warn!("all fan-out branches failed; synthesizing from empty inputs");
        }

        let prompt = build_synthesis_prompt(&question, &branches);
        let synthesis_conversation = Conversation::from_messages(vec![Message::user(prompt)]);

        let synthesis = self
            .invoker
            .single_shot(
                self.config.synthesis_variant,
                SYNTHESIS_INSTRUCTIONS,
                &synthesis_conversation,
                deadline,
            )
            .await?;

        Ok(FanOutResult {
            branches,
            synthesis,
        })
    }

    /// One isolated branch: any error degrades to an empty labeled output
    async fn branch(
        &self,
        family: ProviderFamily,
        variant: ProviderVariant,
        system: &str,
        conversation: &Conversation,
        deadline: Deadline,
    ) -> BranchOutput {
        match self
            .invoker
            .single_shot(variant, system, conversation, deadline)
            .await
        {
            Ok(text) => BranchOutput {
                family,
                text,
                failed: false,
            },
            Err(e) => {
                tracing::warn!(%family, error = %e, "fan-out branch failed, contributing empty output");
                BranchOutput {
                    family,
                    text: String::new(),
                    failed: true,
                }
            }
        }
    }
}

const SYNTHESIS_INSTRUCTIONS: &str = "You are the lead analyst. Three independent analyses of the \
same question are provided below, each from a different research desk. Combine them into one \
coherent answer: reconcile agreements, flag contradictions, and note when a desk returned nothing. \
Do not mention the desks by name in your answer.";

/// Embed the original question and every labeled branch output, empty or
/// not, into the synthesis prompt.
fn build_synthesis_prompt(question: &str, branches: &[BranchOutput]) -> String {
    let mut prompt = format!("Question: {}\n", question);

    for branch in branches {
        prompt.push_str(&format!("\n=== Analysis from desk \"{}\" ===\n", branch.family));
        if branch.text.is_empty() {
            prompt.push_str("(this desk returned no analysis)\n");
        } else {
            prompt.push_str(&branch.text);
            prompt.push('\n');
        }
    }

    prompt.push_str("\nSynthesize the analyses above into a single answer to the question.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesis_prompt_embeds_every_branch() {
        let branches = vec![
            BranchOutput {
                family: ProviderFamily::Gemini,
                text: "A".into(),
                failed: false,
            },
            BranchOutput {
                family: ProviderFamily::OpenAi,
                text: "B".into(),
                failed: false,
            },
            BranchOutput {
                family: ProviderFamily::Perplexity,
                text: String::new(),
                failed: true,
            },
        ];

        let prompt = build_synthesis_prompt("What is the Q3 outlook?", &branches);
        assert!(prompt.contains("What is the Q3 outlook?"));
        assert!(prompt.contains("A"));
        assert!(prompt.contains("B"));
        assert!(prompt.contains("returned no analysis"));
        assert!(prompt.contains("gemini"));
        assert!(prompt.contains("perplexity"));
    }
}
