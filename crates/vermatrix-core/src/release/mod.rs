//! Release pipeline and its signing port.

pub mod pipeline;
pub mod signing;

pub use pipeline::{stage_order, ReleaseCollaborators, ReleasePipeline, SignStep};
pub use signing::{
    CredentialProvider, EnvCredentialProvider, GpgSigner, Signer, SigningCredentials,
    StaticCredentialProvider,
};
