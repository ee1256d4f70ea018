//! Built-in agent catalog and installed-state bookkeeping.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::llm::{ModelManager, OllamaError};

use super::kv_store::{KeyValueStore, StoreError, StoreResult};

/// Filter label matching every category.
pub const ALL_CATEGORIES: &str = "All";

/// Category labels in display order, [`ALL_CATEGORIES`] first.
pub const CATEGORIES: [&str; 6] = [
    ALL_CATEGORIES,
    "Development",
    "Creative",
    "Communication",
    "Analytics",
    "Productivity",
];

const INSTALLED_KEY: &str = "installed";

/// Errors raised while changing an agent's installed state.
#[derive(Debug, Error)]
pub enum MarketplaceError {
    /// The selection could not be persisted.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The inference server rejected the model change.
    #[error("model update failed: {0}")]
    Models(#[from] OllamaError),
}

/// Result alias for marketplace updates.
pub type MarketplaceResult<T> = Result<T, MarketplaceError>;

/// Agent category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    /// Coding assistants.
    Development,
    /// Image and media generation.
    Creative,
    /// Writing and translation.
    Communication,
    /// Data analysis.
    Analytics,
    /// Everyday helpers.
    Productivity,
}

impl Category {
    /// Display label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "Development",
            Self::Creative => "Creative",
            Self::Communication => "Communication",
            Self::Analytics => "Analytics",
            Self::Productivity => "Productivity",
        }
    }

    /// Parse a filter label; [`ALL_CATEGORIES`] yields `None`.
    ///
    /// # Errors
    /// Returns the label back if it names no category.
    pub fn parse_filter(label: &str) -> Result<Option<Self>, String> {
        if label == ALL_CATEGORIES {
            Ok(None)
        } else {
            label.parse().map(Some)
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Development" => Ok(Self::Development),
            "Creative" => Ok(Self::Creative),
            "Communication" => Ok(Self::Communication),
            "Analytics" => Ok(Self::Analytics),
            "Productivity" => Ok(Self::Productivity),
            _ => Err(value.to_string()),
        }
    }
}

/// A marketplace entry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Agent {
    /// Stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Short description.
    pub description: String,
    /// Category.
    pub category: Category,
    /// Average rating out of 5.
    pub rating: f32,
    /// Download count label.
    pub downloads: String,
    /// Search tags.
    pub tags: Vec<String>,
    /// Backing Ollama model, if any.
    pub model: Option<String>,
    /// Shown in the featured section.
    pub featured: bool,
    /// Whether the agent is available.
    pub is_installed: bool,
}

impl Agent {
    fn builtin(
        id: &str,
        name: &str,
        description: &str,
        rating: f32,
        downloads: &str,
        tags: &[&str],
        model: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            category: Category::Development,
            rating,
            downloads: downloads.to_string(),
            tags: tags.iter().map(ToString::to_string).collect(),
            model: Some(model.to_string()),
            featured: false,
            is_installed: false,
        }
    }

    /// Whether name, description or a tag contains `query`, ignoring case.
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || self.description.to_lowercase().contains(&needle)
            || self
                .tags
                .iter()
                .any(|tag| tag.to_lowercase().contains(&needle))
    }
}

/// The built-in agents.
#[must_use]
pub fn builtin_agents() -> Vec<Agent> {
    vec![
        Agent::builtin(
            "1",
            "TinyLlama",
            "Kompaktes Llama3-Modell für schnelle und ressourcensparende Aufgaben.",
            4.3,
            "2.1K",
            &["Llama", "Tiny", "Efficient"],
            "tinyllama:latest",
        ),
        Agent::builtin(
            "2",
            "DeepSeek Coder",
            "Leistungsstarkes Coding-Modell für komplexe Programmieraufgaben.",
            4.7,
            "3.8K",
            &["Coding", "DeepSeek", "AI"],
            "deepseek-coder:latest",
        ),
        Agent::builtin(
            "3",
            "Qwen2.5-Coder 0.5B",
            "Kleines, effizientes Qwen2.5-Modell für Coding-Aufgaben und schnelle Inferenz.",
            4.1,
            "1.2K",
            &["Qwen", "Coding", "Efficient"],
            "qwen2.5-coder:0.5b",
        ),
    ]
}

/// Agent catalog with installed state.
///
/// An agent backed by a model is installed exactly when the server lists
/// that model. Agents without a model keep a user selection persisted in a
/// key-value store.
pub struct Marketplace {
    agents: Vec<Agent>,
    selected: BTreeSet<String>,
    listed: BTreeSet<String>,
    store: Arc<dyn KeyValueStore>,
    namespace: String,
}

impl Marketplace {
    /// Load the built-in catalog and the persisted selections.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read or holds invalid data.
    pub async fn load(
        store: Arc<dyn KeyValueStore>,
        namespace: impl Into<String>,
    ) -> StoreResult<Self> {
        let namespace = namespace.into();
        let selected: BTreeSet<String> = match store.get(&namespace, INSTALLED_KEY).await? {
            Some(json) => serde_json::from_str(&json)?,
            None => BTreeSet::new(),
        };
        debug!(selected = selected.len(), "loaded agent selections");

        let mut marketplace = Self {
            agents: builtin_agents(),
            selected,
            listed: BTreeSet::new(),
            store,
            namespace,
        };
        marketplace.recompute();
        Ok(marketplace)
    }

    fn recompute(&mut self) {
        for agent in &mut self.agents {
            agent.is_installed = match &agent.model {
                Some(model) => self.listed.contains(model),
                None => self.selected.contains(&agent.id),
            };
        }
    }

    /// All agents in catalog order.
    #[must_use]
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// Agent by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|agent| agent.id == id)
    }

    /// Agents in `category` (`None` for all) matching `query`.
    #[must_use]
    pub fn filter(&self, category: Option<Category>, query: &str) -> Vec<&Agent> {
        self.agents
            .iter()
            .filter(|agent| category.is_none_or(|c| agent.category == c))
            .filter(|agent| agent.matches(query))
            .collect()
    }

    /// Update installed flags from the server's model listing.
    pub fn refresh_installed(&mut self, models: &[String]) {
        self.listed = models.iter().cloned().collect();
        self.recompute();
    }

    /// Install an agent. Returns `false` for unknown ids.
    ///
    /// A model-backed agent has its model pulled, then the installed flags
    /// are refreshed from the server's listing.
    ///
    /// # Errors
    /// Returns an error if the model change or the listing fails, or if the
    /// selection cannot be saved.
    pub async fn install(&mut self, id: &str, models: &dyn ModelManager) -> MarketplaceResult<bool> {
        self.set_installed(id, true, models).await
    }

    /// Uninstall an agent. Returns `false` for unknown ids.
    ///
    /// A model-backed agent has its model deleted, then the installed flags
    /// are refreshed from the server's listing.
    ///
    /// # Errors
    /// Returns an error if the model change or the listing fails, or if the
    /// selection cannot be saved.
    pub async fn uninstall(&mut self, id: &str, models: &dyn ModelManager) -> MarketplaceResult<bool> {
        self.set_installed(id, false, models).await
    }

    async fn set_installed(
        &mut self,
        id: &str,
        installed: bool,
        models: &dyn ModelManager,
    ) -> MarketplaceResult<bool> {
        let Some(agent) = self.get(id) else {
            return Ok(false);
        };

        match agent.model.clone() {
            Some(model) => {
                if installed {
                    models.pull_model(&model).await?;
                } else {
                    models.delete_model(&model).await?;
                }
                let listing = models.installed_models().await?;
                self.refresh_installed(&listing);
                info!(agent = id, %model, installed, "updated agent model");
            }
            None => {
                self.update_selection(id, installed).await?;
                info!(agent = id, installed, "updated agent selection");
            }
        }
        Ok(true)
    }

    async fn update_selection(&mut self, id: &str, installed: bool) -> StoreResult<()> {
        if installed {
            self.selected.insert(id.to_string());
        } else {
            self.selected.remove(id);
        }

        let json = serde_json::to_string(&self.selected)?;
        self.store.set(&self.namespace, INSTALLED_KEY, json);
        self.store.save().await?;
        self.recompute();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use crate::agents::kv_store::SqliteKeyValueStore;
    use crate::llm::GenerateFuture;

    /// Model server holding an installed set in memory.
    #[derive(Default)]
    struct FakeModels {
        installed: Mutex<BTreeSet<String>>,
        calls: Mutex<Vec<String>>,
        refuse_pull: bool,
    }

    impl FakeModels {
        fn with(models: &[&str]) -> Self {
            Self {
                installed: Mutex::new(models.iter().map(ToString::to_string).collect()),
                ..Self::default()
            }
        }
    }

    impl ModelManager for FakeModels {
        fn installed_models(&self) -> GenerateFuture<'_, Result<Vec<String>, OllamaError>> {
            let models: Vec<String> = self.installed.lock().unwrap().iter().cloned().collect();
            Box::pin(async move { Ok(models) })
        }

        fn pull_model<'a>(&'a self, model: &'a str) -> GenerateFuture<'a, Result<(), OllamaError>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(format!("pull {model}"));
                if self.refuse_pull {
                    return Err(OllamaError::HttpStatusNotOk(500));
                }
                self.installed.lock().unwrap().insert(model.to_string());
                Ok(())
            })
        }

        fn delete_model<'a>(&'a self, model: &'a str) -> GenerateFuture<'a, Result<(), OllamaError>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(format!("delete {model}"));
                self.installed.lock().unwrap().remove(model);
                Ok(())
            })
        }
    }

    fn note_taker() -> Agent {
        Agent {
            id: "notes".to_string(),
            name: "Note Taker".to_string(),
            description: "Keeps meeting notes.".to_string(),
            category: Category::Productivity,
            rating: 4.0,
            downloads: "10".to_string(),
            tags: vec!["Notes".to_string()],
            model: None,
            featured: false,
            is_installed: false,
        }
    }

    async fn marketplace() -> (Marketplace, Arc<dyn KeyValueStore>) {
        let store: Arc<dyn KeyValueStore> =
            Arc::new(SqliteKeyValueStore::open_in_memory().await.unwrap());
        let marketplace = Marketplace::load(store.clone(), "agents").await.unwrap();
        (marketplace, store)
    }

    #[test]
    fn test_category_filter_labels() {
        assert_eq!(Category::parse_filter("All"), Ok(None));
        assert_eq!(
            Category::parse_filter("Creative"),
            Ok(Some(Category::Creative))
        );
        assert!(Category::parse_filter("Games").is_err());
        for label in &CATEGORIES[1..] {
            assert_eq!(label.parse::<Category>().map(Category::as_str), Ok(*label));
        }
    }

    #[tokio::test]
    async fn test_filter_by_query_and_category() {
        let (marketplace, _) = marketplace().await;
        assert_eq!(marketplace.filter(None, "").len(), 3);

        let coding: Vec<_> = marketplace
            .filter(None, "coding")
            .iter()
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(coding, vec!["2", "3"]);

        assert_eq!(marketplace.filter(None, "TINY").len(), 1);
        assert_eq!(marketplace.filter(Some(Category::Development), "").len(), 3);
        assert!(marketplace.filter(Some(Category::Creative), "").is_empty());
    }

    #[tokio::test]
    async fn test_refresh_installed_from_listing() {
        let (mut marketplace, _) = marketplace().await;
        marketplace.refresh_installed(&["tinyllama:latest".to_string(), "gemma:2b".to_string()]);
        let installed: Vec<_> = marketplace
            .agents()
            .iter()
            .filter(|a| a.is_installed)
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(installed, vec!["1"]);

        marketplace.refresh_installed(&[]);
        assert!(marketplace.agents().iter().all(|a| !a.is_installed));
    }

    #[tokio::test]
    async fn test_install_pulls_model_and_refreshes() {
        let (mut marketplace, _) = marketplace().await;
        let models = FakeModels::with(&["gemma:2b"]);

        assert!(marketplace.install("2", &models).await.unwrap());
        assert!(marketplace.get("2").unwrap().is_installed);
        assert!(!marketplace.get("1").unwrap().is_installed);

        assert!(marketplace.uninstall("2", &models).await.unwrap());
        assert!(!marketplace.get("2").unwrap().is_installed);
        assert_eq!(
            *models.calls.lock().unwrap(),
            vec!["pull deepseek-coder:latest", "delete deepseek-coder:latest"]
        );

        assert!(!marketplace.install("99", &models).await.unwrap());
        assert_eq!(models.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_uninstall_listed_model() {
        let (mut marketplace, _) = marketplace().await;
        let models = FakeModels::with(&["tinyllama:latest"]);
        marketplace.refresh_installed(&["tinyllama:latest".to_string()]);
        assert!(marketplace.get("1").unwrap().is_installed);

        assert!(marketplace.uninstall("1", &models).await.unwrap());
        assert!(!marketplace.get("1").unwrap().is_installed);
        assert!(models.installed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_pull_leaves_state() {
        let (mut marketplace, _) = marketplace().await;
        let models = FakeModels {
            refuse_pull: true,
            ..FakeModels::default()
        };
        let err = marketplace.install("3", &models).await.unwrap_err();
        assert!(matches!(
            err,
            MarketplaceError::Models(OllamaError::HttpStatusNotOk(500))
        ));
        assert!(!marketplace.get("3").unwrap().is_installed);
    }

    #[tokio::test]
    async fn test_modelless_agent_selection_persists() {
        let (mut marketplace, store) = marketplace().await;
        marketplace.agents.push(note_taker());
        let models = FakeModels::default();

        assert!(marketplace.install("notes", &models).await.unwrap());
        assert!(marketplace.get("notes").unwrap().is_installed);
        assert!(models.calls.lock().unwrap().is_empty());

        let saved = store.get("agents", INSTALLED_KEY).await.unwrap();
        assert_eq!(saved.as_deref(), Some(r#"["notes"]"#));

        let mut reloaded = Marketplace::load(store.clone(), "agents").await.unwrap();
        reloaded.agents.push(note_taker());
        reloaded.recompute();
        assert!(reloaded.get("notes").unwrap().is_installed);

        assert!(marketplace.uninstall("notes", &models).await.unwrap());
        assert!(!marketplace.get("notes").unwrap().is_installed);
        let saved = store.get("agents", INSTALLED_KEY).await.unwrap();
        assert_eq!(saved.as_deref(), Some("[]"));
    }
}
