pub mod core;
pub mod storage;
pub mod analysis;
pub mod schema;
pub mod index;
pub mod query;
pub mod catalog;
pub mod mvcc;
pub mod lock;

pub use crate::catalog::catalog::{Catalog, Reindex};
pub use crate::core::config::Config;
pub use crate::core::database::Database;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::session::Session;
pub use crate::core::types::{FieldValue, ObjectId, ObjectRecord};
pub use crate::index::kind::IndexKind;
pub use crate::index::value::{IndexKey, KeyType};
pub use crate::query::criteria::{Criteria, Criterion, Visibility};
pub use crate::query::operator::Operator;
pub use crate::query::types::SortOrder;
pub use crate::schema::schema::{ClassDefinition, Schema};

/*
┌──────────────────────────────────── STRANDEX LAYOUT ─────────────────────────────────────┐
│                                                                                           │
│  Database ── Arc<MVCCController> ── SharedRoot { RootData, version, slot versions }       │
│     │                                                                                     │
│     └── session() ──► Session { snapshot RootData, base_version, WriteSet }               │
│                          │                                                                │
│                          ├── ObjectStore                                                  │
│                          │     counters { last_id, last_temp_id }                         │
│                          │     buckets[ikey = id % 10000] ──► { id ──► ObjectRecord }     │
│                          │     secondary { name ──► id }                                  │
│                          │     temp { -id ──► ObjectRecord }                              │
│                          │                                                                │
│                          └── catalogs[class] ──► Catalog                                  │
│                                 all: IdSet                                                │
│                                 indexes[attribute] ──► Index                              │
│                                     by_value { IndexKey ──► IdSet }                       │
│                                     by_object { id ──► StoredValue }                      │
│                                                                                           │
│  commit: validate read/written slots against versions newer than the snapshot,           │
│          copy written slots into the shared root, checkpoint (bincode + crc32).          │
└───────────────────────────────────────────────────────────────────────────────────────────┘
*/
