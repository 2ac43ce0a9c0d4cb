use thiserror::Error;

use crate::engine::ShaderStage;

pub type Result<T> = std::result::Result<T, InterconnectError>;

/// Failure of a draw or clear. Collaborator failures keep their original error as the source.
#[derive(Debug, Error)]
pub enum InterconnectError {
    #[error("failed to translate {stage} shader")]
    ShaderTranslation {
        stage: ShaderStage,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to create graphics pipeline")]
    PipelineCreation(#[source] anyhow::Error),

    #[error("failed to allocate descriptor set")]
    DescriptorAllocation(#[source] anyhow::Error),

    #[error("failed to upload {size} bytes of generated index data")]
    IndexUpload {
        size: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("index buffer at 0x{address:x} is not backed by guest memory")]
    UnmappedIndexBuffer { address: u64 },

    #[error("failed to submit recorded operation")]
    Submission(#[source] anyhow::Error),
}
