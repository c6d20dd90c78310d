pub mod frame;
pub mod reading;
pub mod row;

pub use frame::{decode, decode_at, decode_captured, encode, CapturedFrame, RawFrame};
pub use reading::{DeviceClass, DeviceId, Measurement, Reading};
pub use row::{to_rows, SheetRow};
