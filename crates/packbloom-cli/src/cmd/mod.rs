pub(crate) mod bloom;
pub(crate) mod lookup;
