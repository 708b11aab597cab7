//! vermatrix-state: collaborator contracts for the release pipeline
//!
//! This crate holds the boundary the release stages talk through. It knows
//! nothing about version matrices or gates; it only stores what the
//! pipeline hands it.
//!
//! ## Layer 0 - Collaborators
//!
//! Focus: publish/tag/announce semantics (overwrite rules, append-only history).
//!
//! ## Key Components
//!
//! - `ArtifactStore`: Upload artifacts under a release version
//! - `TagStore`: Create or force-move release tags
//! - `ReleaseRegistry`: Announce releases, refusing silent duplicates
//! - `LocalRepository`: Filesystem `ArtifactStore` used as the local test repository
//! - `JsonFileReleaseRegistry`: `ReleaseRegistry` keeping one JSON history file per tag

mod error;
pub mod fakes;
pub mod file_registry;
pub mod local_repo;
pub mod storage_traits;

pub use error::StorageError;
pub use file_registry::JsonFileReleaseRegistry;
pub use local_repo::LocalRepository;
pub use storage_traits::{
    Announcement, AnnouncementRecord, ArtifactStore, ContentDigest, PublishedArtifact,
    ReleaseRegistry, StorageResult, TagRecord, TagRequest, TagStore,
};
