//! Editor collaborator.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

/// Opens documents in the user's editor. Fire-and-forget.
pub trait Editor: Send + Sync {
    fn open_document(&self, path: &Path);
}

/// Spawns `<program> <path>`; with no program configured it only logs.
pub struct CommandEditor {
    program: Option<String>,
}

impl CommandEditor {
    pub fn new(program: Option<String>) -> Self {
        Self { program }
    }
}

impl Editor for CommandEditor {
    fn open_document(&self, path: &Path) {
        let Some(program) = &self.program else {
            info!(path = %path.display(), "Open file requested (no editor configured)");
            return;
        };

        let spawned = Command::new(program)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(mut child) => {
                info!(program = %program, path = %path.display(), "Opened file in editor");
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
            }
            Err(e) => warn!(program = %program, error = %e, "Failed to launch editor"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_editor_only_logs() {
        CommandEditor::new(None).open_document(Path::new("/tmp/a.ts"));
    }

    #[tokio::test]
    async fn missing_program_does_not_panic() {
        CommandEditor::new(Some("definitely-not-an-editor".into()))
            .open_document(Path::new("/tmp/a.ts"));
    }
}
