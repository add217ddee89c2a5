//! Rich and plain printing handlers.

use super::ArtifactTable;
use crate::analysis::request::ResponseBody;
use crate::analysis::types::{ArtifactId, Range};
use crate::engine::AnalysisEngine;
use crate::error::RemoteException;

pub fn handle_print_rich<E: AnalysisEngine>(
    engine: &E,
    table: &ArtifactTable<E::Artifact>,
    artifact: ArtifactId,
    range: Range,
) -> Result<ResponseBody, RemoteException> {
    let entry = table.get(artifact)?;
    let parts = engine.print_rich(entry, range)?;
    Ok(ResponseBody::Rich { parts })
}

pub fn handle_print_plain<E: AnalysisEngine>(
    engine: &E,
    table: &ArtifactTable<E::Artifact>,
    artifact: ArtifactId,
    range: Range,
) -> Result<ResponseBody, RemoteException> {
    let entry = table.get(artifact)?;
    let text = engine.print_plain(entry, range)?;
    Ok(ResponseBody::Plain { text })
}
