//! Model selection per tier and use case.
//!
//! [`ModelCatalog`] holds the declared, ranked model lists; models are always
//! considered in declared order. [`resolve_candidates`] pairs those models
//! with the providers able to serve them, and [`model_for_use_case`] skips
//! models the [`UsageTracker`] reports as cooling down.

mod usage;

pub use usage::{UsageRecord, UsageTracker};

use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::config::{Config, Credentials, ModelTables, UseCaseModels};
use crate::error::ConfigError;
use crate::provider::ProviderKind;

/// Billing tier of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Free,
    Paid,
}

/// What the completion is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UseCase {
    Default,
    Search,
    Analysis,
}

impl Tier {
    pub const ALL: [Tier; 2] = [Tier::Free, Tier::Paid];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "FREE",
            Tier::Paid => "PAID",
        }
    }
}

impl UseCase {
    pub const ALL: [UseCase; 3] = [UseCase::Default, UseCase::Search, UseCase::Analysis];

    pub fn as_str(&self) -> &'static str {
        match self {
            UseCase::Default => "default",
            UseCase::Search => "search",
            UseCase::Analysis => "analysis",
        }
    }
}

impl FromStr for Tier {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "paid" => Ok(Tier::Paid),
            _ => Err(ConfigError::UnknownTier(s.to_string())),
        }
    }
}

impl FromStr for UseCase {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(UseCase::Default),
            "search" => Ok(UseCase::Search),
            "analysis" => Ok(UseCase::Analysis),
            _ => Err(ConfigError::UnknownUseCase(s.to_string())),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for UseCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ranked model lists per `(tier, use case)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCatalog {
    free: UseCaseLists,
    paid: UseCaseLists,
}

#[derive(Debug, Clone, PartialEq)]
struct UseCaseLists {
    default: Vec<String>,
    search: Vec<String>,
    analysis: Vec<String>,
}

impl UseCaseLists {
    fn from_static(default: &[&str], search: &[&str], analysis: &[&str]) -> Self {
        let owned = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self {
            default: owned(default),
            search: owned(search),
            analysis: owned(analysis),
        }
    }

    fn overlay(mut self, overrides: Option<&UseCaseModels>) -> Self {
        if let Some(o) = overrides {
            if let Some(list) = &o.default {
                self.default = list.clone();
            }
            if let Some(list) = &o.search {
                self.search = list.clone();
            }
            if let Some(list) = &o.analysis {
                self.analysis = list.clone();
            }
        }
        self
    }

    fn get(&self, use_case: UseCase) -> &[String] {
        match use_case {
            UseCase::Default => &self.default,
            UseCase::Search => &self.search,
            UseCase::Analysis => &self.analysis,
        }
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            free: UseCaseLists::from_static(
                &[
                    "deepseek/deepseek-chat-v3-0324:free",
                    "meta-llama/llama-3.3-70b-instruct:free",
                    "mistralai/mistral-7b-instruct:free",
                ],
                &[
                    "deepseek/deepseek-chat-v3-0324:free",
                    "google/gemma-3-27b-it:free",
                ],
                &[
                    "deepseek/deepseek-r1:free",
                    "deepseek/deepseek-chat-v3-0324:free",
                    "meta-llama/llama-3.3-70b-instruct:free",
                ],
            ),
            paid: UseCaseLists::from_static(
                &["openai/gpt-4o-mini", "anthropic/claude-3.5-haiku"],
                &["openai/gpt-4o-mini", "perplexity/sonar"],
                &["openai/gpt-4o", "anthropic/claude-3.5-sonnet", "openai/gpt-4o-mini"],
            ),
        }
    }
}

impl ModelCatalog {
    /// Built-in tables with any lists declared in config replacing them.
    pub fn from_tables(tables: &ModelTables) -> Self {
        let base = Self::default();
        Self {
            free: base.free.overlay(tables.free.as_ref()),
            paid: base.paid.overlay(tables.paid.as_ref()),
        }
    }

    /// Ranked models for a tier and use case, in declared order.
    pub fn models(&self, tier: Tier, use_case: UseCase) -> Result<&[String], ConfigError> {
        let lists = match tier {
            Tier::Free => &self.free,
            Tier::Paid => &self.paid,
        };
        let models = lists.get(use_case);
        if models.is_empty() {
            return Err(ConfigError::EmptyCandidates {
                tier: tier.to_string(),
                use_case: use_case.to_string(),
            });
        }
        Ok(models)
    }

    /// String-keyed variant of [`ModelCatalog::models`].
    pub fn models_for(&self, tier: &str, use_case: &str) -> Result<&[String], ConfigError> {
        self.models(tier.parse()?, use_case.parse()?)
    }
}

/// Candidate models plus the providers to reach them.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCandidates {
    pub tier: Tier,
    pub use_case: UseCase,
    /// Models in declared order.
    pub models: Vec<String>,
    /// Providers with credentials, in configured order.
    pub providers: Vec<(ProviderKind, Credentials)>,
}

/// Resolves the candidate list for a tier and use case.
///
/// Pure over the config snapshot. Fails with
/// [`ConfigError::NoProviderConfigured`] when no backend has credentials.
pub fn resolve_candidates(
    config: &Config,
    catalog: &ModelCatalog,
    tier: Tier,
    use_case: UseCase,
) -> Result<ResolvedCandidates, ConfigError> {
    let providers = config.configured_providers()?;
    if providers.is_empty() {
        return Err(ConfigError::NoProviderConfigured);
    }
    let models = catalog.models(tier, use_case)?.to_vec();
    Ok(ResolvedCandidates {
        tier,
        use_case,
        models,
        providers,
    })
}

/// Picks the first model in declared order that the tracker deems eligible.
///
/// When every model is cooling down the first declared model is returned;
/// reactive fallback handles it from there.
pub fn model_for_use_case(
    catalog: &ModelCatalog,
    tracker: &UsageTracker,
    tier: Tier,
    use_case: UseCase,
) -> Result<String, ConfigError> {
    let models = catalog.models(tier, use_case)?;
    match models.iter().find(|m| tracker.is_eligible(tier, m)) {
        Some(model) => Ok(model.clone()),
        None => {
            debug!(%tier, %use_case, "No eligible model, using first declared");
            Ok(models[0].clone())
        }
    }
}
