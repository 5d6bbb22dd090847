use crate::enumerate::DEFAULT_ENUMERATE_WORKERS;

pub(super) fn default_workers() -> usize {
    DEFAULT_ENUMERATE_WORKERS
}
