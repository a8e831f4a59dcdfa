//! Name, category and tag index over a set of tools

use crate::control::Permissions;
use aui_core::{Error, ExecutionContext, Result, Tool, ToolCategory, ToolManifest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

const NAME_WEIGHT: u32 = 10;
const DESCRIPTION_WEIGHT: u32 = 5;
const TAG_WEIGHT: u32 = 3;
const CATEGORY_WEIGHT: u32 = 2;

/// Discovery metadata stored next to each registered tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub tags: BTreeSet<String>,
    pub category: ToolCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Permissions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl ToolMetadata {
    /// Metadata derived from the tool itself
    pub fn from_tool(tool: &dyn Tool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            tags: tool.tags().iter().cloned().collect(),
            category: tool.category(),
            permissions: None,
            schema: tool.input_schema(),
        }
    }

    pub fn with_category(mut self, category: ToolCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = Some(permissions);
        self
    }
}

/// A search hit; higher relevance ranks first
#[derive(Clone)]
pub struct SearchResult {
    pub tool: Arc<dyn Tool>,
    pub relevance: u32,
}

impl std::fmt::Debug for SearchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchResult")
            .field("tool", &self.tool.name())
            .field("relevance", &self.relevance)
            .finish()
    }
}

/// Counts reported by [`ToolRegistry::stats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub by_category: BTreeMap<ToolCategory, usize>,
    pub tags: usize,
}

struct Entry {
    tool: Arc<dyn Tool>,
    metadata: ToolMetadata,
}

#[derive(Default)]
struct RegistryState {
    tools: BTreeMap<String, Entry>,
    categories: HashMap<ToolCategory, BTreeSet<String>>,
    tags: HashMap<String, BTreeSet<String>>,
}

impl RegistryState {
    fn insert(&mut self, entry: Entry) -> Option<Entry> {
        let name = entry.metadata.name.clone();
        let previous = self.remove(&name);

        self.categories
            .entry(entry.metadata.category)
            .or_default()
            .insert(name.clone());
        for tag in &entry.metadata.tags {
            self.tags.entry(tag.clone()).or_default().insert(name.clone());
        }
        self.tools.insert(name, entry);

        previous
    }

    fn remove(&mut self, name: &str) -> Option<Entry> {
        let entry = self.tools.remove(name)?;

        if let Some(names) = self.categories.get_mut(&entry.metadata.category) {
            names.remove(name);
            if names.is_empty() {
                self.categories.remove(&entry.metadata.category);
            }
        }
        for tag in &entry.metadata.tags {
            if let Some(names) = self.tags.get_mut(tag) {
                names.remove(name);
                if names.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }

        Some(entry)
    }

    fn resolve<'a>(&self, names: impl IntoIterator<Item = &'a String>) -> Vec<Arc<dyn Tool>> {
        names
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|entry| entry.tool.clone())
            .collect()
    }
}

/// Explicitly constructed tool registry.
///
/// Each server or test builds its own; there is no process-wide instance.
/// Registering a name that already exists replaces the tool and its
/// metadata in one step.
pub struct ToolRegistry {
    state: RwLock<RegistryState>,
    defaults: ExecutionContext,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_defaults(ExecutionContext::server())
    }

    /// Registry whose `execute` falls back to `defaults` for missing context
    /// fields
    pub fn with_defaults(defaults: ExecutionContext) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            defaults,
        }
    }

    pub fn defaults(&self) -> &ExecutionContext {
        &self.defaults
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Registers `tool` with metadata derived from it. Returns the tool it
    /// replaced, if any.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        let metadata = ToolMetadata::from_tool(tool.as_ref());
        self.register_with(tool, metadata)
    }

    /// Registers `tool` with caller-supplied metadata. The metadata name is
    /// always the tool's own name.
    pub fn register_with(&self, tool: Arc<dyn Tool>, mut metadata: ToolMetadata) -> Option<Arc<dyn Tool>> {
        metadata.name = tool.name().to_string();
        tracing::info!(
            tool = %metadata.name,
            category = %metadata.category,
            tags = metadata.tags.len(),
            "Registering tool"
        );

        self.write()
            .insert(Entry { tool, metadata })
            .map(|previous| previous.tool)
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let removed = self.write().remove(name).map(|entry| entry.tool);
        if removed.is_some() {
            tracing::info!(tool = %name, "Unregistered tool");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.read().tools.get(name).map(|entry| entry.tool.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().tools.contains_key(name)
    }

    pub fn metadata(&self, name: &str) -> Option<ToolMetadata> {
        self.read()
            .tools
            .get(name)
            .map(|entry| entry.metadata.clone())
    }

    /// Metadata of every tool, ordered by name
    pub fn list(&self) -> Vec<ToolMetadata> {
        self.read()
            .tools
            .values()
            .map(|entry| entry.metadata.clone())
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.read().tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().tools.is_empty()
    }

    pub fn clear(&self) {
        *self.write() = RegistryState::default();
        tracing::info!("Cleared tool registry");
    }

    pub fn find_by_category(&self, category: ToolCategory) -> Vec<Arc<dyn Tool>> {
        let state = self.read();
        match state.categories.get(&category) {
            Some(names) => state.resolve(names),
            None => Vec::new(),
        }
    }

    pub fn find_by_tag(&self, tag: &str) -> Vec<Arc<dyn Tool>> {
        let state = self.read();
        match state.tags.get(tag) {
            Some(names) => state.resolve(names),
            None => Vec::new(),
        }
    }

    /// Tools carrying every one of `tags`. An empty list matches all tools.
    pub fn find_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> Vec<Arc<dyn Tool>> {
        let state = self.read();
        let matching = state.tools.iter().filter(|(_, entry)| {
            tags.iter()
                .all(|tag| entry.metadata.tags.contains(tag.as_ref()))
        });
        state.resolve(matching.map(|(name, _)| name))
    }

    /// Case-insensitive substring search over name, description, tags and
    /// category.
    ///
    /// Weights are name 10, description 5, any tag 3 and category 2. Ties
    /// are ordered by name. A blank query matches nothing.
    pub fn search(&self, query: &str) -> Vec<SearchResult> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        let state = self.read();
        let mut results: Vec<(String, SearchResult)> = state
            .tools
            .iter()
            .filter_map(|(name, entry)| {
                let relevance = score(&entry.metadata, &query);
                (relevance > 0).then(|| {
                    (
                        name.clone(),
                        SearchResult {
                            tool: entry.tool.clone(),
                            relevance,
                        },
                    )
                })
            })
            .collect();

        results.sort_by(|(a_name, a), (b_name, b)| {
            b.relevance.cmp(&a.relevance).then_with(|| a_name.cmp(b_name))
        });
        results.into_iter().map(|(_, result)| result).collect()
    }

    /// Runs the named tool.
    ///
    /// A caller context keeps its own cache and environment and inherits any
    /// missing identity from the registry defaults. Without one, a fork of
    /// the defaults is used. Permissions stored in the metadata are checked
    /// before the tool runs.
    pub async fn execute(&self, name: &str, input: Value, ctx: Option<ExecutionContext>) -> Result<Value> {
        let (tool, permissions) = {
            let state = self.read();
            let entry = state
                .tools
                .get(name)
                .ok_or_else(|| Error::NotFound(name.to_string()))?;
            (entry.tool.clone(), entry.metadata.permissions)
        };

        let ctx = match ctx {
            Some(ctx) => ctx.inherit(&self.defaults),
            None => self.defaults.fork(),
        };

        if let Some(permissions) = permissions {
            permissions.check(name, &ctx)?;
        }

        tracing::debug!(
            tool = %name,
            invocation_id = %ctx.invocation_id(),
            environment = ctx.environment(),
            "Executing registered tool"
        );

        tool.run(input, Some(ctx)).await
    }

    /// LLM tool-calling manifest for every registered tool, ordered by name
    pub fn export_schema(&self) -> Vec<ToolManifest> {
        self.read()
            .tools
            .values()
            .map(|entry| entry.tool.manifest())
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.read();
        RegistryStats {
            total: state.tools.len(),
            by_category: state
                .categories
                .iter()
                .map(|(category, names)| (*category, names.len()))
                .collect(),
            tags: state.tags.len(),
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .field("defaults", &self.defaults)
            .finish()
    }
}

fn score(metadata: &ToolMetadata, query: &str) -> u32 {
    let mut relevance = 0;
    if metadata.name.to_lowercase().contains(query) {
        relevance += NAME_WEIGHT;
    }
    if metadata.description.to_lowercase().contains(query) {
        relevance += DESCRIPTION_WEIGHT;
    }
    if metadata
        .tags
        .iter()
        .any(|tag| tag.to_lowercase().contains(query))
    {
        relevance += TAG_WEIGHT;
    }
    if metadata.category.as_str().contains(query) {
        relevance += CATEGORY_WEIGHT;
    }
    relevance
}
