//! Artifact lifecycle handlers: construct, destroy, source export.

use super::ArtifactTable;
use crate::analysis::request::ResponseBody;
use crate::analysis::types::ArtifactId;
use crate::engine::AnalysisEngine;
use crate::error::RemoteException;

pub fn handle_construct<E: AnalysisEngine>(
    engine: &mut E,
    table: &mut ArtifactTable<E::Artifact>,
    bytes: Vec<u8>,
) -> Result<ResponseBody, RemoteException> {
    let built = engine.construct(bytes)?;
    // Invalid artifacts are stored too so their source stays retrievable.
    let artifact = table.insert(built.artifact);
    let items = if built.error.is_some() {
        Vec::new()
    } else {
        built.items
    };
    Ok(ResponseBody::Constructed {
        artifact,
        items,
        error: built.error,
    })
}

/// Idempotent: destroying an unknown or already destroyed id still succeeds.
pub fn handle_destroy<A>(table: &mut ArtifactTable<A>, artifact: ArtifactId) -> ResponseBody {
    table.remove(artifact);
    ResponseBody::Destroyed
}

pub fn handle_get_source<E: AnalysisEngine>(
    engine: &E,
    table: &ArtifactTable<E::Artifact>,
    artifact: ArtifactId,
) -> Result<ResponseBody, RemoteException> {
    let entry = table.get(artifact)?;
    let bytes = engine.source(entry)?;
    Ok(ResponseBody::Source { bytes })
}
