//! Beat-keyed timeline of scene mutators.
//!
//! A timeline is an ordered list of segments, each bound to a tick range.
//! Every frame the dispatcher walks the list in authored order and runs the
//! first segment that matches the current clock, like an if/else-if chain:
//!
//! - `WhileInRange` matches every frame with `start_tick <= tick <= end_tick`.
//! - `OnEnter` matches only on the frame the tick becomes `start_tick`.
//!
//! Once the tick moves past the last tick any segment covers, the timeline
//! reports completion and the render loop ends.
//!
//! Actions are responsible for setting the dirty flags of what they change.
//! With [`DirtyGuard::Diffed`] the dispatcher also compares the scene before
//! and after each action and raises any flag the action forgot.

use glam::Vec3;
use serde::Deserialize;

use crate::musical_time::TimelineClock;
use crate::scene_state::{LightSlots, SceneState, SphereSlots};

/// Scene mutator run by a segment: `(clock, elapsed_ms, scene)`.
pub type SegmentAction = Box<dyn FnMut(&TimelineClock, f64, &mut SceneState)>;

/// When a segment fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    /// Once, on the frame the tick reaches `start_tick`.
    OnEnter,
    /// Every frame while the tick lies in `[start_tick, end_tick]`.
    WhileInRange,
}

/// A named tick-range handler.
pub struct Segment {
    name: String,
    start_tick: u32,
    end_tick: u32,
    kind: SegmentKind,
    action: SegmentAction,
}

impl Segment {
    /// Segment that runs every frame for ticks `start_tick..=end_tick`.
    ///
    /// Panics if `end_tick < start_tick`.
    pub fn while_in_range<F>(name: impl Into<String>, start_tick: u32, end_tick: u32, action: F) -> Self
    where
        F: FnMut(&TimelineClock, f64, &mut SceneState) + 'static,
    {
        let name = name.into();
        assert!(
            start_tick <= end_tick,
            "segment '{}' ends (tick {}) before it starts (tick {})",
            name,
            end_tick,
            start_tick
        );
        Self {
            name,
            start_tick,
            end_tick,
            kind: SegmentKind::WhileInRange,
            action: Box::new(action),
        }
    }

    /// Segment that runs once, on the beat that brings the tick to `tick`.
    pub fn on_enter<F>(name: impl Into<String>, tick: u32, action: F) -> Self
    where
        F: FnMut(&TimelineClock, f64, &mut SceneState) + 'static,
    {
        Self {
            name: name.into(),
            start_tick: tick,
            end_tick: tick,
            kind: SegmentKind::OnEnter,
            action: Box::new(action),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start_tick(&self) -> u32 {
        self.start_tick
    }

    pub fn end_tick(&self) -> u32 {
        self.end_tick
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    /// Whether this segment would fire for `clock`.
    pub fn matches(&self, clock: &TimelineClock) -> bool {
        match self.kind {
            SegmentKind::OnEnter => clock.on_tick && clock.tick == self.start_tick,
            SegmentKind::WhileInRange => (self.start_tick..=self.end_tick).contains(&clock.tick),
        }
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("name", &self.name)
            .field("start_tick", &self.start_tick)
            .field("end_tick", &self.end_tick)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// How dirty flags are established after an action runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DirtyGuard {
    /// Trust the flags the action set.
    Explicit,
    /// Diff the scene around the action and raise missing flags.
    #[default]
    Diffed,
}

/// Result of one dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Segment `segment` ran; `entered` is true if a different segment ran
    /// on the previous dispatch (or none did).
    Ran { segment: usize, entered: bool },
    /// No segment matched, but later ticks are still covered.
    Idle,
    /// The tick is past every segment. Terminal.
    Complete,
}

/// Scene contents an action may change, captured before it runs.
struct SceneSnapshot {
    spheres: SphereSlots,
    lights: LightSlots,
    ambient: f32,
    origin: Vec3,
    target: Vec3,
}

impl SceneSnapshot {
    fn capture(scene: &SceneState) -> Self {
        Self {
            spheres: scene.spheres.clone(),
            lights: scene.lights.clone(),
            ambient: scene.ambient,
            origin: scene.camera.origin,
            target: scene.camera.target,
        }
    }

    /// Raise flags for categories that changed without being flagged.
    fn flag_changes(&self, scene: &mut SceneState, segment: &str) {
        let objects_changed = self.spheres.active() != scene.spheres.active();
        let lights_changed =
            self.lights.active() != scene.lights.active() || self.ambient != scene.ambient;
        let camera_changed =
            self.origin != scene.camera.origin || self.target != scene.camera.target;

        if objects_changed && !scene.dirty.objects {
            log::warn!("segment '{}' changed objects without flagging them", segment);
            scene.dirty.objects = true;
        }
        if lights_changed && !scene.dirty.lights {
            log::warn!("segment '{}' changed lights without flagging them", segment);
            scene.dirty.lights = true;
        }
        if camera_changed && !scene.dirty.camera {
            log::warn!("segment '{}' moved the camera without flagging it", segment);
            scene.dirty.camera = true;
        }
    }
}

/// Ordered segment list plus dispatch bookkeeping.
#[derive(Debug, Default)]
pub struct Timeline {
    segments: Vec<Segment>,
    guard: DirtyGuard,
    last_tick: Option<u32>,
    current: Option<usize>,
}

impl Timeline {
    pub fn new(guard: DirtyGuard) -> Self {
        Self {
            segments: Vec::new(),
            guard,
            last_tick: None,
            current: None,
        }
    }

    /// Append a segment (builder style).
    pub fn with_segment(mut self, segment: Segment) -> Self {
        self.push(segment);
        self
    }

    /// Append a segment. Earlier segments win when several match.
    pub fn push(&mut self, segment: Segment) {
        self.last_tick = Some(
            self.last_tick
                .map_or(segment.end_tick, |last| last.max(segment.end_tick)),
        );
        self.segments.push(segment);
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn guard(&self) -> DirtyGuard {
        self.guard
    }

    pub fn set_guard(&mut self, guard: DirtyGuard) {
        self.guard = guard;
    }

    /// Highest tick covered by any segment.
    pub fn last_tick(&self) -> Option<u32> {
        self.last_tick
    }

    pub fn segment(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    /// Index of the segment that ran on the last dispatch.
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Whether `tick` lies past every segment.
    pub fn is_complete_at(&self, tick: u32) -> bool {
        self.last_tick.map_or(true, |last| tick > last)
    }

    /// Index of the first segment matching `clock`.
    pub fn find_segment(&self, clock: &TimelineClock) -> Option<usize> {
        self.segments.iter().position(|segment| segment.matches(clock))
    }

    /// Run the first segment matching `clock` against `scene`.
    pub fn dispatch(
        &mut self,
        clock: &TimelineClock,
        elapsed_ms: f64,
        scene: &mut SceneState,
    ) -> DispatchOutcome {
        if self.is_complete_at(clock.tick) {
            if self.current.take().is_some() {
                log::info!("timeline complete at tick {}", clock.tick);
            }
            return DispatchOutcome::Complete;
        }

        let Some(index) = self.find_segment(clock) else {
            self.current = None;
            return DispatchOutcome::Idle;
        };

        let entered = self.current != Some(index);
        self.current = Some(index);

        let segment = &mut self.segments[index];
        if entered {
            log::info!(
                "timeline: segment '{}' at tick {} ({:.0}ms)",
                segment.name,
                clock.tick,
                elapsed_ms
            );
        }

        match self.guard {
            DirtyGuard::Explicit => (segment.action)(clock, elapsed_ms, scene),
            DirtyGuard::Diffed => {
                let before = SceneSnapshot::capture(scene);
                (segment.action)(clock, elapsed_ms, scene);
                before.flag_changes(scene, &segment.name);
            }
        }

        DispatchOutcome::Ran {
            segment: index,
            entered,
        }
    }
}
