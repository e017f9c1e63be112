//! Adjoint and control region bookkeeping.
//!
//! Regions are resolved entirely inside the dispatcher. Backends only ever see
//! the per-instruction result: an adjoint flag and a flat control list.

use qxm_ir::QuditInfo;

use crate::error::{ManagerError, ManagerResult};

/// Nested adjoint depth plus a LIFO stack of control frames.
#[derive(Debug, Default, Clone)]
pub struct RegionStack {
    adjoint_depth: usize,
    control_frames: Vec<Vec<QuditInfo>>,
}

impl RegionStack {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter an adjoint region.
    pub fn begin_adjoint(&mut self) {
        self.adjoint_depth += 1;
    }

    /// Leave the innermost adjoint region.
    pub fn end_adjoint(&mut self) -> ManagerResult<()> {
        if self.adjoint_depth == 0 {
            return Err(ManagerError::protocol(
                "end of adjoint region without a matching start",
            ));
        }
        self.adjoint_depth -= 1;
        Ok(())
    }

    /// Enter a control region on `qudits`. Returns the frame size that the
    /// matching [`RegionStack::end_control`] must pass.
    pub fn begin_control(&mut self, qudits: &[QuditInfo]) -> usize {
        self.control_frames.push(qudits.to_vec());
        qudits.len()
    }

    /// Leave the innermost control region, which must hold exactly `n`
    /// qudits.
    pub fn end_control(&mut self, n: usize) -> ManagerResult<()> {
        match self.control_frames.last() {
            None => Err(ManagerError::protocol(format!(
                "end of control region ({n} controls) without a matching start"
            ))),
            Some(frame) if frame.len() != n => Err(ManagerError::protocol(format!(
                "control region holds {} controls but {n} were popped",
                frame.len()
            ))),
            Some(_) => {
                self.control_frames.pop();
                Ok(())
            }
        }
    }

    /// Nested adjoint regions cancel in pairs.
    #[inline]
    pub fn effective_adjoint(&self) -> bool {
        self.adjoint_depth % 2 == 1
    }

    /// Controls contributed by open control regions, outermost first.
    pub fn region_controls(&self) -> impl Iterator<Item = &QuditInfo> {
        self.control_frames.iter().flatten()
    }

    /// `explicit` followed by every region control not already present.
    pub fn effective_controls(&self, explicit: &[QuditInfo]) -> Vec<QuditInfo> {
        let mut controls = Vec::with_capacity(explicit.len() + self.num_region_controls());
        for q in explicit.iter().chain(self.region_controls()) {
            if !controls.contains(q) {
                controls.push(*q);
            }
        }
        controls
    }

    /// Current adjoint nesting depth.
    pub fn adjoint_depth(&self) -> usize {
        self.adjoint_depth
    }

    /// Number of open control frames.
    pub fn control_depth(&self) -> usize {
        self.control_frames.len()
    }

    /// Total qudits across open control frames.
    pub fn num_region_controls(&self) -> usize {
        self.control_frames.iter().map(Vec::len).sum()
    }

    /// True when no region is open.
    pub fn is_balanced(&self) -> bool {
        self.adjoint_depth == 0 && self.control_frames.is_empty()
    }
}
