// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{error::QueryError, sql::quote_literal};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLocation {
    pub team_prefix: String,
    pub table_base_name: String,
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn resolve(&self, name: &str) -> Option<SourceLocation>;

    /// Ordered member names of a source group.
    async fn resolve_group(&self, group: &str) -> Option<Vec<String>>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhysicalSource {
    pub logical_name: String,
    pub team_prefix: String,
    pub table_base_name: String,
}

impl PhysicalSource {
    pub fn new(logical_name: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            logical_name: logical_name.into(),
            team_prefix: location.team_prefix,
            table_base_name: location.table_base_name,
        }
    }

    pub fn live_table(&self) -> String {
        format!("remote({}_{}_logs)", self.team_prefix, self.table_base_name)
    }

    pub fn historical_table(&self, cluster: &str) -> String {
        format!(
            "s3Cluster({cluster}, {}_{}_s3, filename='{{{{_s3_glob_interpolate}}}}')",
            self.team_prefix, self.table_base_name
        )
    }

    /// `<team>.<table>`, the form the storage layer prunes on.
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.team_prefix, self.table_base_name)
    }

    pub fn label(&self) -> String {
        format!("{} as source", quote_literal(&self.logical_name))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSelection {
    Sources(Vec<String>),
    Group(String),
}

/// Resolves a selection in caller order, dropping repeated names.
pub async fn resolve_selection(
    directory: &dyn Directory,
    selection: &SourceSelection,
) -> Result<Vec<PhysicalSource>, QueryError> {
    let names = match selection {
        SourceSelection::Sources(names) => names.clone(),
        SourceSelection::Group(group) => directory.resolve_group(group).await.ok_or_else(|| {
            QueryError::SourceNotFound(format!("Source group not found: {group}"))
        })?,
    };
    if names.is_empty() {
        return Err(QueryError::validation("At least one source must be selected"));
    }
    let mut sources: Vec<PhysicalSource> = Vec::with_capacity(names.len());
    for name in names {
        if sources.iter().any(|source| source.logical_name == name) {
            continue;
        }
        let location = directory
            .resolve(&name)
            .await
            .ok_or_else(|| QueryError::SourceNotFound(format!("Source not found: {name}")))?;
        sources.push(PhysicalSource::new(name, location));
    }
    Ok(sources)
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SourceCatalog {
    #[serde(default)]
    pub sources: Vec<CatalogSource>,
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CatalogSource {
    pub name: String,
    pub team_prefix: String,
    pub table: String,
}

#[derive(Clone, Debug, Default)]
pub struct StaticDirectory {
    sources: HashMap<String, SourceLocation>,
    groups: BTreeMap<String, Vec<String>>,
}

impl StaticDirectory {
    pub fn from_catalog(catalog: SourceCatalog) -> Self {
        let sources = catalog
            .sources
            .into_iter()
            .map(|source| {
                (
                    source.name,
                    SourceLocation {
                        team_prefix: source.team_prefix,
                        table_base_name: source.table,
                    },
                )
            })
            .collect();
        Self {
            sources,
            groups: catalog.groups,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, QueryError> {
        let catalog: SourceCatalog = serde_json::from_str(raw)
            .map_err(|err| QueryError::Config(format!("invalid source catalog: {err}")))?;
        Ok(Self::from_catalog(catalog))
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn resolve(&self, name: &str) -> Option<SourceLocation> {
        self.sources.get(name).cloned()
    }

    async fn resolve_group(&self, group: &str) -> Option<Vec<String>> {
        self.groups.get(group).cloned()
    }
}
