use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use zbus::{dbus_interface, Connection};
use zvariant::OwnedObjectPath;
use zvariant_derive::{DeserializeDict, SerializeDict, Type};

use crate::util::command;
use crate::Config;

const STR_COMMA: &str = ",";
const STR_FILE: &str = "File";
const STR_DIRECTORY: &str = "Directory";
const NAMEFILTER_ARG: &str = " -f";
const DIRECTORY_ARG: &str = " -d";
const SAVEFILE_ARG: &str = " -s";

const MIME_TYPE_DEFAULT: &str = "application/octet-stream";

#[derive(Default, Clone)]
pub struct FileChooser {}

impl FileChooser {
    pub async fn init(connection: &Connection) -> zbus::Result<()> {
        connection
            .object_server()
            .at(super::PORTAL_PATH, FileChooser {})
            .await?;

        log::info!("FileChooser portal enabled.");

        Ok(())
    }

    fn open_file_sync(
        &self,
        picker: &str,
        _handle: OwnedObjectPath,
        _app_id: &str,
        _parent_window: &str,
        title: &str,
        options: OpenFileOptions,
    ) -> (u32, OpenFileResults) {
        let modal = options.modal.unwrap_or(true);
        let multiple = options.multiple.unwrap_or_default();
        let directory = options.directory.unwrap_or_default();
        // modal and multiple are accepted for protocol conformance but do not
        // change the command line; the dialog tool is always modal and only
        // ever reports a single selection.
        log::debug!("\tmodal: {} multiple: {}", modal, multiple);

        let accept_label = extract_accept_label(options.accept_label.as_deref());
        if !accept_label.is_empty() {
            log::debug!("\taccept_label: {}", accept_label);
        }

        // the dialog tool has no flag to start in a given directory
        let current_folder = options.current_folder.as_deref().and_then(decode_file_name);
        if let Some(folder) = &current_folder {
            log::debug!("\tcurrent_folder: {}", folder);
        }

        let extracted = extract_filters(
            options.filters.as_deref().unwrap_or_default(),
            options.current_filter.as_ref(),
        );
        log::debug!("\tname_filters: {}", extracted.name_filters.join(STR_COMMA));
        if let Some(selected) = &extracted.selected_filter {
            log::debug!("\tcurrent_filter: {:?}", extracted.all_filters.get(selected));
        }

        // open directory
        if directory && options.choices.is_none() {
            let mut cmd = dialog_command(picker, &title.replace(STR_FILE, STR_DIRECTORY));
            cmd.push_str(DIRECTORY_ARG);
            log::debug!("\tcommand: {}", cmd);

            let ret = command::run(&cmd);
            let selected = ret.text.trim();
            if selected.is_empty() {
                log::debug!("Failed to open directory: no local directory selected");
                return (2, OpenFileResults::default());
            }

            return (
                0,
                OpenFileResults {
                    uris: vec![selected.to_string()],
                    writable: Some(true),
                },
            );
        }

        let mut cmd = dialog_command(picker, title);
        if !extracted.name_filters.is_empty() {
            // name_filters is a string list,
            // ex: [ "Custom Files (*.jpg *.JPG *.png *.PNG)", "All Files (*.*)" ]
            // joined by comma for the dialog tool argument
            cmd.push_str(&format!(
                "{} '{}'",
                NAMEFILTER_ARG,
                extracted.name_filters.join(STR_COMMA)
            ));
        }
        log::debug!("\tcommand: {}", cmd);

        let ret = command::run(&cmd);
        let selected = ret.text.trim();
        if selected.is_empty() {
            log::debug!("Failed to open file: no local file selected");
            return (2, OpenFileResults::default());
        }

        (
            0,
            OpenFileResults {
                uris: vec![selected.to_string()],
                writable: Some(true),
            },
        )
    }

    fn save_file_sync(
        &self,
        picker: &str,
        _handle: OwnedObjectPath,
        _app_id: &str,
        _parent_window: &str,
        title: &str,
        options: SaveFileOptions,
    ) -> (u32, SaveFileResults) {
        let modal = options.modal.unwrap_or(true);
        log::debug!("\tmodal: {}", modal);

        let accept_label = extract_accept_label(options.accept_label.as_deref());
        if !accept_label.is_empty() {
            log::debug!("\taccept_label: {}", accept_label);
        }

        if let Some(name) = &options.current_name {
            log::debug!("\tcurrent_name: {}", name);
        }

        // decoded for diagnostics; the dialog tool cannot preselect a
        // starting directory or file
        let current_folder = options.current_folder.as_deref().and_then(decode_file_name);
        if let Some(folder) = &current_folder {
            log::debug!("\tcurrent_folder: {}", folder);
        }
        let current_file = options.current_file.as_deref().and_then(decode_file_name);
        if let Some(file) = &current_file {
            log::debug!("\tcurrent_file: {}", file);
        }

        let extracted = extract_filters(
            options.filters.as_deref().unwrap_or_default(),
            options.current_filter.as_ref(),
        );
        log::debug!("\tname_filters: {}", extracted.name_filters.join(STR_COMMA));
        if let Some(selected) = &extracted.selected_filter {
            log::debug!("\tcurrent_filter: {:?}", extracted.all_filters.get(selected));
        }

        let mut cmd = dialog_command(picker, title);
        if !extracted.name_filters.is_empty() {
            cmd.push_str(&format!(
                "{} '{}'",
                NAMEFILTER_ARG,
                extracted.name_filters.join(STR_COMMA)
            ));
        }
        cmd.push_str(SAVEFILE_ARG);
        log::debug!("\tcommand: {}", cmd);

        let ret = command::run(&cmd);
        let selected = ret.text.trim();
        if selected.is_empty() {
            log::debug!("Failed to save file: no local file selected");
            return (2, SaveFileResults::default());
        }

        (
            0,
            SaveFileResults {
                uris: vec![selected.to_string()],
            },
        )
    }
}

fn dialog_command(picker: &str, title: &str) -> String {
    format!("{} -t '{}'", picker, title)
}

// The portal may send us null terminated strings. Make sure to strip the
// extraneous \0 before building the file URI.
fn decode_file_name(name: &[u8]) -> Option<String> {
    let mut name = name;
    while let Some((&0, rest)) = name.split_last() {
        name = rest;
    }
    let path = String::from_utf8(name.to_vec()).ok()?;
    if path.is_empty() {
        return None;
    }
    Some(format!("file://{}", path))
}

fn extract_accept_label(accept_label: Option<&str>) -> String {
    match accept_label {
        Some(label) => {
            // 'accept_label' allows mnemonic underlines, but the dialog
            // toolkit uses '&', so escape literal '&'s and transform the
            // mnemonic underline to its equivalent
            let mut label = label.replace('&', "&&");
            if let Some(mnemonic_pos) = label.find('_') {
                label.replace_range(mnemonic_pos..mnemonic_pos + 1, "&");
            }
            label
        }
        None => String::new(),
    }
}

#[derive(Debug, Default)]
struct ExtractedFilters {
    name_filters: Vec<String>,
    // mapping between filter strings and actual filters
    all_filters: HashMap<String, FileFilter>,
    selected_filter: Option<String>,
}

fn extract_filters(
    filters: &[FileFilter],
    current_filter: Option<&FileFilter>,
) -> ExtractedFilters {
    let mut extracted = ExtractedFilters::default();

    for filter_list in filters {
        let mut filter_strings = Vec::new();
        for (filter_type, filter_string) in &filter_list.filters {
            match filter_type {
                FilterType::GlobPattern => filter_strings.push(filter_string.clone()),
                FilterType::MimeType => {
                    filter_strings.extend(name_filters_for_mime_type(filter_string))
                }
            }
        }

        if !filter_strings.is_empty() {
            let name_filter = format!("{} ({})", filter_list.label, filter_strings.join(" "));
            extracted.name_filters.push(name_filter.clone());
            extracted.all_filters.insert(name_filter, filter_list.clone());
        }
    }

    if let Some(filter_list) = current_filter {
        if filter_list.filters.len() == 1 {
            let (filter_type, filter_string) = &filter_list.filters[0];
            let filter_strings = match filter_type {
                FilterType::GlobPattern => vec![filter_string.clone()],
                FilterType::MimeType => name_filters_for_mime_type(filter_string),
            };

            if !filter_strings.is_empty() {
                // make the relevant entry the first one in the list of
                // filters, since that is the one the dialog preselects
                let name_filter = format!("{} ({})", filter_list.label, filter_strings.join(" "));
                extracted.name_filters.retain(|f| f != &name_filter);
                extracted.name_filters.insert(0, name_filter.clone());
                extracted.selected_filter = Some(name_filter);
            }
        } else {
            log::debug!("Ignoring 'current_filter' parameter with 0 or multiple filters specified.");
        }
    }

    extracted
}

fn name_filters_for_mime_type(mime_type: &str) -> Vec<String> {
    if mime_type == MIME_TYPE_DEFAULT {
        return vec![String::from("*")];
    }

    match new_mime_guess::get_mime_extensions_str(mime_type) {
        Some(extensions) => extensions
            .iter()
            .map(|extension| format!("*.{}", extension))
            .collect(),
        None => Vec::new(),
    }
}

#[dbus_interface(name = "org.freedesktop.impl.portal.FileChooser")]
impl FileChooser {
    async fn open_file(
        &mut self,
        handle: OwnedObjectPath,
        app_id: String,
        parent_window: String,
        title: String,
        options: OpenFileOptions,
    ) -> (u32, OpenFileResults) {
        log::debug!("open_file called: ");
        log::debug!("\thandle: {}", handle.as_str());
        log::debug!("\tapp_id: {}", app_id);
        log::debug!("\tparent_window: {}", parent_window);
        log::debug!("\ttitle: {}", title);
        log::debug!("\toptions: {:?}", options);

        let c = self.clone();
        let picker = Config::global().picker_command().to_string();

        match tokio::task::spawn_blocking(move || {
            c.open_file_sync(&picker, handle, &app_id, &parent_window, &title, options)
        })
        .await
        {
            Ok(r) => r,
            Err(e) => {
                log::error!("open_file errored: {}", e);
                (2, OpenFileResults::default())
            }
        }
    }

    async fn save_file(
        &mut self,
        handle: OwnedObjectPath,
        app_id: String,
        parent_window: String,
        title: String,
        options: SaveFileOptions,
    ) -> (u32, SaveFileResults) {
        log::debug!("save_file called: ");
        log::debug!("\thandle: {}", handle.as_str());
        log::debug!("\tapp_id: {}", app_id);
        log::debug!("\tparent_window: {}", parent_window);
        log::debug!("\ttitle: {}", title);
        log::debug!("\toptions: {:?}", options);

        let c = self.clone();
        let picker = Config::global().picker_command().to_string();

        match tokio::task::spawn_blocking(move || {
            c.save_file_sync(&picker, handle, &app_id, &parent_window, &title, options)
        })
        .await
        {
            Ok(r) => r,
            Err(e) => {
                log::error!("save_file errored: {}", e);
                (2, SaveFileResults::default())
            }
        }
    }
}

#[derive(Serialize, Deserialize, Type, Clone, Debug, PartialEq)]
/// A file filter, to limit the available file choices to a mimetype or a glob
/// pattern.
pub struct FileFilter {
    label: String,
    filters: Vec<(FilterType, String)>,
}

#[derive(Serialize_repr, Clone, Deserialize_repr, PartialEq, Debug, Type)]
#[repr(u32)]
#[doc(hidden)]
enum FilterType {
    GlobPattern = 0,
    MimeType = 1,
}

#[derive(Serialize, Deserialize, Type, Clone, Debug, PartialEq)]
/// Presents the user with a choice to select from or as a checkbox. Carried
/// through the wire format but not shown by the dialog tool.
pub struct Choice {
    id: String,
    label: String,
    choices: Vec<(String, String)>,
    initial_selection: String,
}

#[derive(DeserializeDict, SerializeDict, Type, Clone, Debug, Default, PartialEq)]
#[zvariant(signature = "dict")]
pub struct OpenFileOptions {
    accept_label: Option<String>,
    modal: Option<bool>,
    multiple: Option<bool>,
    directory: Option<bool>,
    current_folder: Option<Vec<u8>>,
    filters: Option<Vec<FileFilter>>,
    current_filter: Option<FileFilter>,
    choices: Option<Vec<Choice>>,
}

#[derive(DeserializeDict, SerializeDict, Type, Clone, Debug, Default, PartialEq)]
#[zvariant(signature = "dict")]
pub struct OpenFileResults {
    uris: Vec<String>,
    writable: Option<bool>,
}

#[derive(DeserializeDict, SerializeDict, Type, Clone, Debug, Default, PartialEq)]
#[zvariant(signature = "dict")]
pub struct SaveFileOptions {
    accept_label: Option<String>,
    modal: Option<bool>,
    current_name: Option<String>,
    current_folder: Option<Vec<u8>>,
    current_file: Option<Vec<u8>>,
    filters: Option<Vec<FileFilter>>,
    current_filter: Option<FileFilter>,
    choices: Option<Vec<Choice>>,
}

#[derive(DeserializeDict, SerializeDict, Type, Clone, Debug, Default, PartialEq)]
#[zvariant(signature = "dict")]
pub struct SaveFileResults {
    uris: Vec<String>,
}
