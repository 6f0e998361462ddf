//! Print regioned buffer layouts
//!
//! Usage: check_region_layout [instance_size] [config.toml]
//!
//! Without configured limits, layouts are shown for wgpu's default and
//! WebGL2 downlevel limits.

use anyhow::{Context, Result};
use regioned_buffer::{DeviceLimits, LayoutConfig, RegionLayout};

const DEFAULT_INSTANCE_SIZE: u64 = 64;

fn print_layout(name: &str, instance_size: u64, limits: DeviceLimits, config: &LayoutConfig) -> Result<()> {
    let buffer = &config.buffer;
    let layout = RegionLayout::compute(
        instance_size,
        buffer.instances_per_region,
        buffer.num_regions,
        limits,
        buffer.capabilities(),
    )
    .with_context(|| format!("computing layout for {}", name))?;

    println!("=== {} ===", name);
    println!("{}", layout);
    println!("TotalSize: {}", layout.total_size());
    println!();
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let size_arg = args.next();
    let config = match args.next() {
        Some(path) => LayoutConfig::from_toml_file(&path)
            .with_context(|| format!("loading layout config from {}", path))?,
        None => LayoutConfig::default(),
    };

    let instance_size = match size_arg {
        Some(arg) => arg
            .parse::<u64>()
            .with_context(|| format!("invalid instance size '{}'", arg))?,
        None => config.instance_size.unwrap_or(DEFAULT_INSTANCE_SIZE),
    };
    log::debug!("[check_region_layout] Using {:?}", config.buffer);

    if let Some(limits) = config.limits {
        return print_layout("Configured limits", instance_size, limits, &config);
    }

    let usage = config.buffer.usage;
    print_layout(
        "wgpu default limits",
        instance_size,
        DeviceLimits::from_wgpu(&wgpu::Limits::default(), usage),
        &config,
    )?;
    print_layout(
        "WebGL2 downlevel limits",
        instance_size,
        DeviceLimits::from_wgpu(&wgpu::Limits::downlevel_webgl2_defaults(), usage),
        &config,
    )
}
