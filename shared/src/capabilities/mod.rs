mod file;
pub mod kv;
mod ticker;
mod tone;

pub use self::file::{FileError, SaveFile, SaveFileOperation};
pub use self::kv::{KvError, KvKey, KvResult, MAX_VALUE_SIZE};
pub use self::ticker::{Ticker, TickerOperation};
pub use self::tone::{Tone, ToneOperation, ToneSpec};

pub use crux_core::render::Render;
pub use crux_kv::KeyValue;

use crate::event::Event;

/// Field types are spelled out so the generated `Effect` variants are
/// `Render`, `KeyValue`, `Tone`, `Ticker` and `SaveFile`.
#[derive(crux_core::macros::Effect)]
pub struct Capabilities {
    pub render: Render<Event>,
    pub kv: KeyValue<Event>,
    pub tone: Tone<Event>,
    pub ticker: Ticker<Event>,
    pub file: SaveFile<Event>,
}
