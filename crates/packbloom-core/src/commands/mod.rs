pub mod bloom;
pub mod lookup;
