// Plexfarm Infrastructure - System Adapters
// Implements: ProcessLauncher, CpuProbe

pub mod cpu_probe_impl;
pub mod transcoder_launcher;

pub use cpu_probe_impl::SysinfoCpuProbe;
pub use transcoder_launcher::TranscoderLauncher;
