use futures::future::join_all;
use tokio::task::JoinHandle;

use crate::{MonolayerError, MonolayerResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A spawned reconciliation of one subdirectory.
pub(crate) type LevelTask = JoinHandle<MonolayerResult<()>>;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Waits for every subdirectory task spawned at one level and collects the failures.
///
/// The inline result of the level comes first, followed by the child failures in spawn order.
/// Children are always awaited, even when the inline work already failed, so no task is left
/// running against a tree its caller considers finished.
pub(crate) async fn settle(
    inline: MonolayerResult<()>,
    children: Vec<LevelTask>,
) -> Vec<MonolayerError> {
    let mut errors = Vec::new();
    if let Err(e) = inline {
        errors.push(e);
    }

    for joined in join_all(children).await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => errors.push(e),
            Err(e) => errors.push(MonolayerError::from(e)),
        }
    }

    errors
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
