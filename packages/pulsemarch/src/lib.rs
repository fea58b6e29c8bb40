pub mod gpu;
pub mod visualiser;
pub mod perf_profiling;

// Beat-locked scene engine
pub mod musical_time;
pub mod timeline;
pub mod choreography;
pub mod frame_pacer;
pub mod playback;

// Scene data
pub mod camera;
pub mod material;
pub mod lighting;
pub mod scene_state;
pub mod uploader;

pub mod cli;
