//! Entity registry: the ordered, fixed set of synchronizable entities
//!
//! Each entity is bound to the `DeltaFetcher` that serves its records. The
//! registry is validated once at construction; an invalid registry is a
//! deployment error and never reaches a sync run.

use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::config::EntityConfig;
use crate::core::datasource::{DeltaFetcher, RecordSource, TableFetcher};
use tidemark_api::EntityDescriptor;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Entity registry is empty")]
    Empty,

    #[error("Entity '{name}' is registered more than once")]
    DuplicateEntity { name: String },

    #[error("Invalid entity name '{name}': use letters, digits and '_' only")]
    InvalidName { name: String },

    #[error("Invalid cursor field '{field}' for entity '{entity}'")]
    InvalidCursorField { entity: String, field: String },

    #[error("Invalid table '{table}' for entity '{entity}'")]
    InvalidTable { entity: String, table: String },
}

/// SQL-safe identifier: ASCII letter or `_`, then letters, digits or `_`
pub fn is_valid_identifier(identifier: &str) -> bool {
    let mut chars = identifier.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

pub struct RegisteredEntity {
    descriptor: EntityDescriptor,
    fetcher: Arc<dyn DeltaFetcher>,
}

impl RegisteredEntity {
    pub fn descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn fetcher(&self) -> &dyn DeltaFetcher {
        self.fetcher.as_ref()
    }
}

pub struct EntityRegistry {
    entities: Vec<RegisteredEntity>,
}

impl EntityRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Bind every configured entity to its table on the shared record source
    pub fn from_config(
        entities: &[EntityConfig],
        source: Arc<dyn RecordSource>,
    ) -> Result<Self, RegistryError> {
        let mut builder = Self::builder();
        for entity in entities {
            if !is_valid_identifier(entity.table_name()) {
                return Err(RegistryError::InvalidTable {
                    entity: entity.name.clone(),
                    table: entity.table_name().to_string(),
                });
            }
            let fetcher = TableFetcher::new(
                source.clone(),
                entity.table_name(),
                entity.cursor_field.clone(),
            );
            builder = builder.register(
                EntityDescriptor::new(entity.name.clone(), entity.cursor_field.clone()),
                Arc::new(fetcher),
            );
        }
        builder.build()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredEntity> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredEntity> {
        self.entities.iter().find(|e| e.name() == name)
    }
}

#[derive(Default)]
pub struct RegistryBuilder {
    entities: Vec<RegisteredEntity>,
}

impl RegistryBuilder {
    pub fn register(mut self, descriptor: EntityDescriptor, fetcher: Arc<dyn DeltaFetcher>) -> Self {
        self.entities.push(RegisteredEntity {
            descriptor,
            fetcher,
        });
        self
    }

    pub fn build(self) -> Result<EntityRegistry, RegistryError> {
        if self.entities.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut seen = HashSet::new();
        for entity in &self.entities {
            let descriptor = &entity.descriptor;
            if !is_valid_identifier(&descriptor.name) {
                return Err(RegistryError::InvalidName {
                    name: descriptor.name.clone(),
                });
            }
            if !is_valid_identifier(&descriptor.cursor_field) {
                return Err(RegistryError::InvalidCursorField {
                    entity: descriptor.name.clone(),
                    field: descriptor.cursor_field.clone(),
                });
            }
            if !seen.insert(descriptor.name.as_str()) {
                return Err(RegistryError::DuplicateEntity {
                    name: descriptor.name.clone(),
                });
            }
        }

        Ok(EntityRegistry {
            entities: self.entities,
        })
    }
}
