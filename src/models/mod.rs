//! Data models for the component audit pipeline.

mod detection;
mod inventory;
mod label;

pub use detection::{ComponentKey, Confidence, Detection, StoredDetection};
pub use inventory::{DiscoveredUrl, InventoryStats, RenderMode, RenderStat, UrlRecord, UrlStatus};
pub use label::{Decision, Label};
