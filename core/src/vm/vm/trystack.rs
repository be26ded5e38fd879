use super::Vm;
use super::frame::ExecCtx;

#[derive(Debug, Clone)]
pub(super) struct TryRegion {
    /// Frame pointer of the function that opened the region.
    pub(super) frame: usize,
    pub(super) catch_target: usize,
    pub(super) finally_target: Option<usize>,
    /// A catch clause accepted an exception; it is discarded when the region ends.
    pub(super) caught: bool,
    /// Execution reached the finally clause.
    pub(super) in_finally: bool,
    pub(super) pending_return: bool,
    /// A catch clause of this region is executing.
    pub(super) in_catch: bool,
    /// Stack depth when the region was entered.
    pub(super) stack_len: usize,
}

impl TryRegion {
    pub(super) fn new(frame: usize, stack_len: usize, catch_target: usize, finally_target: usize) -> Self {
        Self {
            frame,
            catch_target,
            finally_target: (finally_target != 0).then_some(finally_target),
            caught: false,
            in_finally: false,
            pending_return: false,
            in_catch: false,
            stack_len,
        }
    }

    /// A pending exception waits until the region ends.
    pub(super) fn in_handler(&self) -> bool {
        self.in_catch || self.in_finally
    }

    /// Note that instruction `iidx` is about to run.
    pub(super) fn reach(&mut self, iidx: usize) {
        if self.finally_target == Some(iidx) {
            self.in_finally = true;
        }
    }

    /// Route a `Return` through the finally clause; `None` when there is
    /// none or it is already running.
    pub(super) fn begin_return(&mut self) -> Option<usize> {
        if self.in_finally {
            return None;
        }
        let target = self.finally_target?;
        self.pending_return = true;
        Some(target)
    }
}

impl Vm<'_> {
    /// Close `region`. A caught exception is discarded unless a new one is
    /// pending. `abandoned` regions are left by a `Return` without reaching
    /// `EndTry`; an exception waiting on them is dropped as well.
    pub(super) fn end_region(&mut self, region: &TryRegion, abandoned: bool) {
        let exceptions = self.host.exceptions();
        exceptions.leave_try();
        if region.caught {
            exceptions.finish_caught();
        }
        let pending = exceptions.did_throw();
        if (region.caught && !pending) || (abandoned && pending && region.in_handler()) {
            exceptions.discard_current();
        }
    }

    /// Close the regions the running frame opened.
    pub(super) fn leave_frame_regions(&mut self, ectx: &mut ExecCtx) {
        let frame = ectx.frame;
        while ectx.trystack.last().is_some_and(|t| t.frame == frame) {
            if let Some(region) = ectx.trystack.pop() {
                self.end_region(&region, true);
            }
        }
    }
}
