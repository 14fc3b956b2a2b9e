//! Frame counters shared between the simulation and the renderer.

/// Simulation and draw frame numbers.
///
/// The simulation advances at a fixed rate while draw frames follow the
/// display, so the two counters move independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounters {
    /// Frames rendered since start.
    pub draw_frame: u64,
    /// Simulation frames processed since start.
    pub sim_frame: u64,
}

impl FrameCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the draw counter at the start of a rendered frame.
    pub fn advance_draw(&mut self) -> u64 {
        self.draw_frame += 1;
        self.draw_frame
    }

    /// Advance the simulation counter after a sim step.
    pub fn advance_sim(&mut self) -> u64 {
        self.sim_frame += 1;
        self.sim_frame
    }

    /// Whole simulation seconds elapsed, at the given sim rate.
    pub fn sim_seconds(&self, sim_rate: u32) -> u64 {
        if sim_rate == 0 {
            return 0;
        }
        self.sim_frame / u64::from(sim_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_advance_independently() {
        let mut f = FrameCounters::new();
        f.advance_draw();
        f.advance_draw();
        f.advance_sim();
        assert_eq!(f.draw_frame, 2);
        assert_eq!(f.sim_frame, 1);
    }

    #[test]
    fn sim_seconds_handles_zero_rate() {
        let f = FrameCounters { draw_frame: 0, sim_frame: 90 };
        assert_eq!(f.sim_seconds(30), 3);
        assert_eq!(f.sim_seconds(0), 0);
    }
}
