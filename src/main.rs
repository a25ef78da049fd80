//! Ring Runner headless demo
//!
//! Runs a course on autoplay with a logging gate factory and reports the
//! events the host would receive. Pass a settings JSON path to run it instead
//! of the built-in demo course.

use glam::Vec3;

use ring_runner::Settings;
use ring_runner::consts::*;
use ring_runner::sim::{
    Course, GateFactory, GateTemplate, Pose, RunEvent, RunPhase, RunState, TickInput, VisualHandle,
    tick,
};

/// Host frame time the demo pretends to render at
const FRAME_DT: f32 = 1.0 / 30.0;
/// Give up after this many frames even if the course is not finished
const MAX_FRAMES: u32 = 30 * 120;

/// Factory that only logs what a renderer would do
#[derive(Default)]
struct LogFactory {
    next: u64,
    live: usize,
    peak: usize,
}

impl GateFactory for LogFactory {
    fn spawn(&mut self, index: i64, template: &GateTemplate, pose: &Pose) -> VisualHandle {
        self.next += 1;
        self.live += 1;
        self.peak = self.peak.max(self.live);
        log::trace!(
            "spawn gate {} mesh {:?} radius {:.0} at {:?}",
            index,
            template.mesh,
            template.radius,
            pose.position
        );
        VisualHandle(self.next)
    }

    fn destroy(&mut self, handle: VisualHandle) {
        self.live = self.live.saturating_sub(1);
        log::trace!("destroy {:?}", handle);
    }
}

/// Demo game loop state
struct Runner {
    state: RunState,
    factory: LogFactory,
    accumulator: f32,
    input: TickInput,
}

impl Runner {
    fn new(settings: Settings, course: Course) -> Self {
        Self {
            state: RunState::new(settings, course),
            factory: LogFactory::default(),
            accumulator: 0.0,
            input: TickInput {
                autoplay: true,
                ..Default::default()
            },
        }
    }

    /// Run simulation ticks for one host frame
    fn update(&mut self, dt: f32) {
        let dt = dt.min(0.1);
        self.accumulator += dt;

        let mut substeps = 0;
        while self.accumulator >= SIM_DT && substeps < MAX_SUBSTEPS {
            tick(&mut self.state, &self.input, &mut self.factory, SIM_DT);
            self.accumulator -= SIM_DT;
            substeps += 1;

            // Clear one-shot inputs after processing
            self.input.action = false;
            self.input.pause = false;
        }

        for event in self.state.drain_events() {
            match event {
                RunEvent::BeatSuccess(i) => log::info!("beat {} hit", i),
                RunEvent::BeatFail(Some(i)) => log::info!("beat {} failed", i),
                RunEvent::BeatFail(None) => log::info!("fail"),
                RunEvent::ObstacleHit(i) => log::info!("obstacle on gate {} struck", i),
                RunEvent::CourseCompleted => log::info!("course completed"),
                RunEvent::GateSpawned(i) => log::debug!("gate {} spawned", i),
                RunEvent::GateDestroyed(i) => log::debug!("gate {} destroyed", i),
            }
        }
    }
}

/// A gently winding course through a few hills
fn demo_course() -> Result<Course, ring_runner::ConfigError> {
    Course::new(vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(5000.0, 1200.0, 0.0),
        Vec3::new(10_000.0, -800.0, 600.0),
        Vec3::new(15_000.0, 400.0, 1200.0),
        Vec3::new(20_000.0, 0.0, 400.0),
        Vec3::new(26_000.0, -1500.0, 0.0),
    ])
}

fn main() -> Result<(), ring_runner::ConfigError> {
    env_logger::init();
    log::info!("Ring Runner (headless) starting...");

    let settings = match std::env::args().nth(1) {
        Some(path) => Settings::load(&path)?,
        None => Settings::demo(),
    };
    let course = demo_course()?;
    log::info!("Course length {:.0}", course.length());

    let mut runner = Runner::new(settings, course);
    let mut frames = 0;
    while runner.state.phase != RunPhase::Completed && frames < MAX_FRAMES {
        runner.update(FRAME_DT);
        frames += 1;
    }

    let stats = runner.state.judge().stats();
    println!(
        "distance {:.0} in {} ticks: {} hits, {} fails, best streak {}, peak gates {}",
        runner.state.player.distance,
        runner.state.time_ticks,
        stats.successes,
        stats.fails,
        stats.best_streak,
        runner.factory.peak
    );
    Ok(())
}
