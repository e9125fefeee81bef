use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum FileError {
    #[error("invalid file name '{0}'")]
    InvalidName(String),
}

/// Hands a file to the user as a download.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaveFileOperation {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl SaveFileOperation {
    pub fn new(
        file_name: impl Into<String>,
        mime: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Self, FileError> {
        let file_name = file_name.into();
        if file_name.trim().is_empty()
            || file_name.contains(['/', '\\'])
            || file_name.chars().any(char::is_control)
        {
            return Err(FileError::InvalidName(file_name));
        }
        Ok(Self {
            file_name,
            mime: mime.into(),
            bytes,
        })
    }
}

impl Operation for SaveFileOperation {
    type Output = ();
}

#[derive(Clone)]
pub struct SaveFile<Ev> {
    context: CapabilityContext<SaveFileOperation, Ev>,
}

impl<Ev> Capability<Ev> for SaveFile<Ev> {
    type Operation = SaveFileOperation;
    type MappedSelf<MappedEv> = SaveFile<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static,
    {
        SaveFile::new(self.context.map_event(f))
    }
}

impl<Ev> SaveFile<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<SaveFileOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn save(&self, operation: SaveFileOperation) {
        let ctx = self.context.clone();
        self.context.spawn(async move {
            ctx.notify_shell(operation).await;
        });
    }
}
