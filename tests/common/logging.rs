use aggcore::util::log_util;

#[allow(unused)] // used in tests
pub fn init_default_logging() {
    log_util::init();
}
