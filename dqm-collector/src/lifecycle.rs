//! Ties [`RunControl`]'s SOR/EOR signals to the collector's storage and
//! archiver: start-of-run clears storage, end-of-run snapshots it to disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dqm_archive::Archiver;
use dqm_core::MonitorElementManager;
use dqm_runcontrol::{Run, RunControl};
use tracing::{error, info};

/// Connects `run_control`'s signals so that starting a run clears the
/// manager's storage and ending one archives a snapshot of it under
/// `archive_dir`.
pub fn wire(run_control: &RunControl, manager: Arc<MonitorElementManager>, archiver: Arc<Archiver>, archive_dir: PathBuf) {
    let sor_manager = manager.clone();
    run_control.start_of_run.connect(move |run: &Run| {
        info!(run_number = run.number(), "start-of-run: clearing collector storage");
        sor_manager.clear();
    });

    run_control.end_of_run.connect(move |run: &Run| {
        if let Err(error) = archive_run(&archiver, &manager, &archive_dir, run) {
            error!(run_number = run.number(), %error, "archiving end-of-run snapshot failed");
        }
    });
}

fn archive_run(archiver: &Archiver, manager: &MonitorElementManager, archive_dir: &Path, run: &Run) -> dqm_archive::Result<()> {
    let name = archive_dir.join(format!("run{:06}.dqmtar", run.number()));
    archiver.open(&name.to_string_lossy(), "RECREATE", false, Some(run.number()))?;
    let count = archiver.archive_with_references(manager.storage(), "/", "_ref")?;
    archiver.close()?;
    info!(run_number = run.number(), elements = count, "archived end-of-run snapshot");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dqm_core::XmlElement;

    #[test]
    fn end_of_run_archives_booked_elements() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(MonitorElementManager::new());
        let archiver = Arc::new(Archiver::new());
        let run_control = RunControl::new();
        wire(&run_control, manager.clone(), archiver.clone(), dir.path().to_path_buf());

        let desc = XmlElement::parse(r#"<monitorElement type="int" name="n"/>"#).unwrap();
        manager.book_from_xml(&desc, Some("/det")).unwrap();

        run_control.start_new_run(Run::new(1, "", "").unwrap(), None);
        run_control.end_current_run(Default::default(), None);

        assert!(dir.path().join("run000001.dqmtar").exists());
    }
}
