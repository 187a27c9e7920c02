//! Native dialogs. Only ever used on the main thread.

use std::path::{Path, PathBuf};

use gltf_desk_core::{DialogPrompt, FilePicker};

/// Dialogs the desktop needs beyond file selection.
pub trait DesktopPicker: FilePicker {
    fn pick_folder(&self, title: &str) -> Option<PathBuf>;
}

/// Dialogs backed by the platform's native toolkit.
pub struct RfdPicker;

impl FilePicker for RfdPicker {
    fn pick_file(&self, prompt: &DialogPrompt) -> Option<PathBuf> {
        let mut dialog = rfd::FileDialog::new().set_title(prompt.title.as_str());
        for filter in &prompt.filters {
            let extensions = filter.extensions();
            // "All files" needs no filter entry; rfd offers it implicitly.
            if !extensions.is_empty() {
                dialog = dialog.add_filter(filter.label.as_str(), extensions.as_slice());
            }
        }
        dialog.pick_file()
    }

    fn confirm_large_file(&self, path: &Path, size_bytes: u64) -> bool {
        let answer = rfd::MessageDialog::new()
            .set_level(rfd::MessageLevel::Warning)
            .set_title("Large File Warning")
            .set_description(large_file_message(path, size_bytes))
            .set_buttons(rfd::MessageButtons::YesNo)
            .show();
        matches!(answer, rfd::MessageDialogResult::Yes)
    }
}

impl DesktopPicker for RfdPicker {
    fn pick_folder(&self, title: &str) -> Option<PathBuf> {
        rfd::FileDialog::new().set_title(title).pick_folder()
    }
}

fn large_file_message(path: &Path, size_bytes: u64) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!(
        "{}\nFile size: {:.1} MB\n\nThis is a very large file. Loading may take some time.\nDo you want to continue?",
        name,
        size_bytes as f64 / (1024.0 * 1024.0)
    )
}
