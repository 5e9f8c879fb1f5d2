use chunkferry_protocol::chunk_file_name;

/// Maps sessions onto storage keys.
///
/// ```text
/// {staging}/{session_id}/{file_name}_chunk_{ordinal}   working area
/// {final}/{session_id}/{file_name}                      artifact
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    staging_area: String,
    final_area: String,
}

impl StorageLayout {
    pub fn new(staging_area: impl Into<String>, final_area: impl Into<String>) -> Self {
        Self {
            staging_area: staging_area.into(),
            final_area: final_area.into(),
        }
    }

    /// Per-session directory holding chunk files.
    pub fn working_area(&self, session_id: &str) -> String {
        format!("{}/{session_id}", self.staging_area)
    }

    pub fn chunk_key(&self, session_id: &str, file_name: &str, ordinal: u32) -> String {
        format!(
            "{}/{}",
            self.working_area(session_id),
            chunk_file_name(file_name, ordinal)
        )
    }

    /// Final directory, derived from the working area by swapping the
    /// namespace segment and keeping the session segment.
    pub fn final_dir(&self, session_id: &str) -> String {
        let working = self.working_area(session_id);
        match working.split_once('/') {
            Some((_, rest)) => format!("{}/{rest}", self.final_area),
            None => format!("{}/{working}", self.final_area),
        }
    }

    pub fn artifact_key(&self, session_id: &str, file_name: &str) -> String {
        format!("{}/{file_name}", self.final_dir(session_id))
    }
}
