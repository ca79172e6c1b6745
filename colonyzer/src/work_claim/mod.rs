//! Advisory claiming of barcodes between independent workers.
//!
//! Workers coordinate only through the filesystem: a zero-length marker
//! next to the outputs of a batch's earliest image means the batch is taken.
//! Creating the marker is the single atomic step. A worker that built its
//! index before another worker's marker appeared will still find the batch
//! listed, and only learns it lost when its own exclusive create fails. On
//! network filesystems even that create is not guaranteed to be atomic.
//!
//! Markers are never removed here. A crashed worker leaves its marker
//! behind without outputs; clearing such markers is an operator task.


use std::fs::OpenOptions;
use std::io::ErrorKind;

use crate::barcode_index::BarcodeBatch;
use crate::error::ClaimError;
use crate::layout::OutputLayout;

/// At-most-one-worker claim on a batch.
///
/// Swapping the filesystem marker for a lease in a shared store only needs a
/// new implementation of this trait.
pub trait WorkClaim {
    /// `true` if the batch is claimed or already analysed.
    fn is_claimed(&self, batch: &BarcodeBatch) -> bool;

    /// Try to take the batch. `Ok(false)` means someone else holds it.
    fn try_claim(&self, batch: &BarcodeBatch) -> Result<bool, ClaimError>;
}

/// Claims batches by exclusively creating `Output_Data/<earliest stem>.out`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkerFileClaim;

impl WorkClaim for MarkerFileClaim {
    fn is_claimed(&self, batch: &BarcodeBatch) -> bool {
        let earliest = batch.earliest();
        OutputLayout::for_image(earliest)
            .marker_path(earliest)
            .exists()
    }

    fn try_claim(&self, batch: &BarcodeBatch) -> Result<bool, ClaimError> {
        let earliest = batch.earliest();
        let layout = OutputLayout::for_image(earliest);
        let path = layout.marker_path(earliest);

        let data_dir = layout.data_dir();
        std::fs::create_dir_all(&data_dir).map_err(|source| ClaimError::CreateMarker {
            path: data_dir.clone(),
            source,
        })?;

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => {
                tracing::debug!("Claimed {} with {}", batch.barcode, path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::warn!(
                    "Barcode {} was claimed by another worker ({} exists)",
                    batch.barcode,
                    path.display()
                );
                Ok(false)
            }
            Err(source) => Err(ClaimError::CreateMarker { path, source }),
        }
    }
}
