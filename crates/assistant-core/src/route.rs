//! Mode Selector
//!
//! Decides, per request, which provider variant to target and which
//! behavioral mode is active. Pure function of the model selector string
//! and the conversation history, so identical requests always route
//! identically.

use crate::error::{AssistantError, Result};
use crate::message::Conversation;
use crate::provider::{ProviderFamily, ProviderVariant};

/// Request-scoped behavioral profile
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActiveMode {
    Default,
    /// Tool-calling loop with the portfolio toolkit
    Portfolio,
    /// Meta-mode: fan out to all families and synthesize
    CombinedAnalysis,
}

/// Routing decision for one request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Route {
    pub variant: ProviderVariant,
    pub mode: ActiveMode,
}

/// Model selector string that activates combined analysis
pub const COMBINED_ANALYSIS_MODEL: &str = "combined-analysis";

/// Phrase that activates portfolio mode. Scanned over every user turn in
/// the history, so the mode stays sticky for the rest of the conversation.
pub const PORTFOLIO_TRIGGER: &str = "portfolio";

/// Map a model selector prefix to a provider family. Closed mapping; an
/// unrecognized prefix is a hard configuration-style error, never a silent
/// fallback.
fn family_for_model(model: &str) -> Result<ProviderFamily> {
    let m = model.trim().to_ascii_lowercase();
    if m.starts_with("gemini") {
        Ok(ProviderFamily::Gemini)
    } else if m.starts_with("gpt") {
        Ok(ProviderFamily::OpenAi)
    } else if m.starts_with("sonar") || m.starts_with("perplexity") {
        Ok(ProviderFamily::Perplexity)
    } else {
        Err(AssistantError::UnknownModel(model.to_string()))
    }
}

fn base_variant(family: ProviderFamily, model: &str) -> ProviderVariant {
    match family {
        ProviderFamily::Gemini => {
            if model.to_ascii_lowercase().contains("pro") {
                ProviderVariant::GeminiPro
            } else {
                ProviderVariant::GeminiFlash
            }
        }
        ProviderFamily::OpenAi => ProviderVariant::OpenAiStandard,
        ProviderFamily::Perplexity => ProviderVariant::PerplexitySonar,
    }
}

/// Select the route for a request.
///
/// Combined analysis takes precedence over per-family routing entirely: it
/// drives three invoker calls internally regardless of the nominal model
/// selection. The variant on a combined route is only the synthesis default
/// and is not used for branch dispatch.
pub fn select_route(model: &str, conversation: &Conversation) -> Result<Route> {
    if model.trim().eq_ignore_ascii_case(COMBINED_ANALYSIS_MODEL) {
        return Ok(Route {
            variant: ProviderVariant::OpenAiStandard,
            mode: ActiveMode::CombinedAnalysis,
        });
    }

    let family = family_for_model(model)?;

    if conversation.any_user_message_contains(PORTFOLIO_TRIGGER) {
        // Tool calling requires a higher-capability variant of the same
        // family. Families without one stay in default mode.
        if let Some(upgraded) = ProviderVariant::tool_upgrade(family) {
            return Ok(Route {
                variant: upgraded,
                mode: ActiveMode::Portfolio,
            });
        }
        tracing::debug!(%family, "portfolio trigger present but family has no tool-capable variant");
    }

    Ok(Route {
        variant: base_variant(family, model),
        mode: ActiveMode::Default,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    fn conv(texts: &[&str]) -> Conversation {
        Conversation::from_messages(texts.iter().map(|t| Message::user(*t)).collect())
    }

    #[test]
    fn test_prefix_mapping() {
        let c = conv(&["hello"]);
        assert_eq!(
            select_route("gemini-2.0-flash", &c).unwrap().variant,
            ProviderVariant::GeminiFlash
        );
        assert_eq!(
            select_route("gemini-1.5-pro", &c).unwrap().variant,
            ProviderVariant::GeminiPro
        );
        assert_eq!(
            select_route("gpt-4o-mini", &c).unwrap().variant,
            ProviderVariant::OpenAiStandard
        );
        assert_eq!(
            select_route("sonar-pro", &c).unwrap().variant,
            ProviderVariant::PerplexitySonar
        );
    }

    #[test]
    fn test_unknown_prefix_is_hard_error() {
        let err = select_route("llama3.2", &conv(&["hi"])).unwrap_err();
        assert!(matches!(err, AssistantError::UnknownModel(_)));
    }

    #[test]
    fn test_portfolio_trigger_in_earlier_turn_is_sticky() {
        let c = Conversation::from_messages(vec![
            Message::user("Can you review my portfolio?"),
            Message::assistant("Of course."),
            Message::user("What about tech exposure?"),
        ]);

        let route = select_route("gemini-2.0-flash", &c).unwrap();
        assert_eq!(route.mode, ActiveMode::Portfolio);
        assert_eq!(route.variant, ProviderVariant::GeminiPro);
    }

    #[test]
    fn test_portfolio_upgrade_stays_in_family() {
        let c = conv(&["rebalance my portfolio"]);
        let route = select_route("gpt-4o-mini", &c).unwrap();
        assert_eq!(route.mode, ActiveMode::Portfolio);
        assert_eq!(route.variant, ProviderVariant::OpenAiToolUse);
    }

    #[test]
    fn test_portfolio_trigger_ignored_without_tool_variant() {
        let c = conv(&["my portfolio again"]);
        let route = select_route("sonar-pro", &c).unwrap();
        assert_eq!(route.mode, ActiveMode::Default);
        assert_eq!(route.variant, ProviderVariant::PerplexitySonar);
    }

    #[test]
    fn test_combined_analysis_takes_precedence() {
        let c = conv(&["portfolio outlook please"]);
        let route = select_route("combined-analysis", &c).unwrap();
        assert_eq!(route.mode, ActiveMode::CombinedAnalysis);
    }

    #[test]
    fn test_routing_is_idempotent() {
        let c = conv(&["Check my portfolio", "and NVDA"]);
        let first = select_route("gemini-2.0-flash", &c).unwrap();
        let second = select_route("gemini-2.0-flash", &c).unwrap();
        assert_eq!(first, second);
    }
}
