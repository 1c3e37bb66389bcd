use std::cell::Cell;
use std::rc::Rc;

/// Routes `log` output through the test harness; `RUST_LOG=trace` shows switches.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Sets a flag when dropped, to observe stack unwinding.
#[allow(dead_code)]
pub struct SetOnDrop(pub Rc<Cell<bool>>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.set(true);
    }
}
