//! Thermalright LCD / LED Diagnostic CLI
//!
//! Command-line interface for probing Thermalright cooler displays and LED
//! controllers, pushing images and animations, and inspecting theme files.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::{Arc, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use trcc_rust_devices::device::hid::list_hid_devices;
use trcc_rust_devices::device::registry::{KNOWN_DEVICES, TransportKind};
use trcc_rust_devices::device::{
    DeviceDescriptor, DeviceDriver, DeviceRegistry, Implementation, ProtocolDriver, SharedDriver,
    is_sg_raw_available, is_usb_device_present,
};
use trcc_rust_devices::protocol::{HandshakeResult, KVM_CHANNELS};
use trcc_rust_devices::storage::{AnimationContainer, AnimationPlayer, ThemeContainer};
use trcc_rust_devices::utils::color::{TEMP_GRADIENT, color_for_value, generate_rainbow_table};
use trcc_rust_devices::utils::image_processing::{byte_order_for, encode_rgb565, load_frame};
use trcc_rust_devices::utils::parsing::{
    parse_device, parse_hex_color, parse_resolution, parse_rotation,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Thermalright LCD / LED Diagnostic Tool
#[derive(Parser, Debug)]
#[command(name = "trcc-lcd-cli")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

/// Which device to talk to.
#[derive(clap::Args, Debug)]
struct DeviceTarget {
    /// VID:PID in hex, e.g. 0416:5302
    device: String,

    /// Device node (required for SCSI, e.g. /dev/sg1)
    #[arg(long)]
    path: Option<String>,

    /// Transport override: scsi, bulk or hid
    #[arg(long)]
    transport: Option<String>,

    /// Fallback resolution when the device does not report one
    #[arg(long, value_parser = resolution_arg)]
    resolution: Option<(u32, u32)>,

    /// Treat the HID device as a 10-channel KVM LED controller
    #[arg(long)]
    kvm: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List known devices and whether they are plugged in
    List,

    /// Run the protocol handshake and print what the device reports
    Handshake {
        #[command(flatten)]
        target: DeviceTarget,
    },

    /// Send a still image to an LCD
    SendImage {
        #[command(flatten)]
        target: DeviceTarget,

        /// Image file (png, jpg, bmp, ...)
        image: PathBuf,

        /// Display rotation in degrees (0, 90, 180, 270)
        #[arg(short, long, default_value = "0")]
        rotation: String,
    },

    /// Play a Theme.zt animation until Ctrl+C
    Play {
        #[command(flatten)]
        target: DeviceTarget,

        /// Animation file (.zt)
        animation: PathBuf,

        /// Play once instead of looping
        #[arg(long)]
        once: bool,
    },

    /// Drive an LED controller with a solid color or a rainbow
    Led {
        #[command(flatten)]
        target: DeviceTarget,

        /// Solid color as #RRGGBB (omit for rainbow)
        #[arg(short, long)]
        color: Option<String>,

        /// Brightness percentage (0-100)
        #[arg(short, long, default_value = "100",
              value_parser = clap::value_parser!(u8).range(0..=100))]
        brightness: u8,
    },

    /// Print the contents of a .tr theme file
    InspectTheme {
        /// Theme file (.tr)
        path: PathBuf,
    },

    /// Print the frame table of a .zt animation file
    InspectAnimation {
        /// Animation file (.zt)
        path: PathBuf,
    },

    /// Print the LED rainbow table and the temperature gradient
    ColorTable {
        /// Print every Nth rainbow entry
        #[arg(short, long, default_value = "32")]
        step: usize,
    },
}

fn resolution_arg(s: &str) -> std::result::Result<(u32, u32), String> {
    parse_resolution(s).map_err(|e| e.to_string())
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    match args.command {
        Command::List => cmd_list(),
        Command::Handshake { target } => cmd_handshake(&target),
        Command::SendImage {
            target,
            image,
            rotation,
        } => cmd_send_image(&target, &image, &rotation),
        Command::Play {
            target,
            animation,
            once,
        } => cmd_play(&target, &animation, once),
        Command::Led {
            target,
            color,
            brightness,
        } => cmd_led(&target, color.as_deref(), brightness),
        Command::InspectTheme { path } => cmd_inspect_theme(&path),
        Command::InspectAnimation { path } => cmd_inspect_animation(&path),
        Command::ColorTable { step } => cmd_color_table(step),
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn descriptor(target: &DeviceTarget) -> Result<DeviceDescriptor> {
    let mut desc = parse_device(
        &target.device,
        target.path.as_deref(),
        target.transport.as_deref(),
    )
    .context("Invalid device selection")?;
    if let Some(res) = target.resolution {
        desc = desc.with_resolution(res);
    }
    if target.kvm {
        desc = desc.with_implementation(Implementation::KvmLed);
    }
    Ok(desc)
}

fn open(registry: &DeviceRegistry, target: &DeviceTarget) -> Result<(DeviceDescriptor, SharedDriver)> {
    let desc = descriptor(target)?;
    let driver = registry
        .get_protocol(&desc)
        .with_context(|| format!("No driver for {}", desc))?;
    Ok((desc, driver))
}

fn lock(driver: &SharedDriver) -> MutexGuard<'_, ProtocolDriver> {
    driver.lock().unwrap_or_else(|e| e.into_inner())
}

/// Handshake and insist on a usable answer.
fn handshake_ok(driver: &SharedDriver) -> Result<HandshakeResult> {
    let result = lock(driver).handshake().context("Handshake failed")?;
    if let Some(reason) = &result.error {
        bail!("Device answered but was not recognized: {}", reason);
    }
    Ok(result)
}

fn lcd_resolution(info: &HandshakeResult) -> Result<(u32, u32)> {
    if info.protocol.is_led() {
        bail!("{} is an LED controller; use the `led` command", info.protocol);
    }
    info.resolution()
        .context("Device did not report a resolution; pass --resolution")
}

fn ctrlc_flag() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;
    Ok(running)
}

// =============================================================================
// Command Implementations
// =============================================================================

fn cmd_list() -> Result<()> {
    println!("Known devices:");
    for dev in KNOWN_DEVICES.iter() {
        let present = is_usb_device_present(dev.vid, dev.pid);
        println!(
            "  {} {:04x}:{:04x}  {:<10} {:<24} {:?}/{:?}",
            if present { "●" } else { "○" },
            dev.vid,
            dev.pid,
            dev.vendor,
            dev.product,
            dev.transport,
            dev.implementation
        );
    }

    for dev in KNOWN_DEVICES.iter().filter(|d| d.transport == TransportKind::UsbHid) {
        for (path, serial) in list_hid_devices(dev.vid, dev.pid).unwrap_or_default() {
            println!(
                "    {:04x}:{:04x} hid path {} serial {}",
                dev.vid,
                dev.pid,
                path,
                serial.as_deref().unwrap_or("-")
            );
        }
    }

    if !is_sg_raw_available() {
        println!("\n⚠️  sg_raw not found; SCSI displays need sg3_utils installed.");
    }
    Ok(())
}

fn cmd_handshake(target: &DeviceTarget) -> Result<()> {
    let registry = DeviceRegistry::system();
    let (desc, driver) = open(&registry, target)?;

    println!("🔌 Handshaking with {}...", desc);
    let result = lock(&driver).handshake().context("Handshake failed")?;
    print!("{}", result);
    println!("Raw (first 32): {}", result.raw_prefix_hex(32));

    if let Some(reason) = result.error {
        bail!("Device was not recognized: {}", reason);
    }
    Ok(())
}

fn cmd_send_image(target: &DeviceTarget, image: &Path, rotation: &str) -> Result<()> {
    let rotation = parse_rotation(rotation)?;
    let registry = DeviceRegistry::system();
    let (desc, driver) = open(&registry, target)?;

    let info = handshake_ok(&driver)?;
    let (width, height) = lcd_resolution(&info)?;
    println!("🖥️  {} at {}x{}", desc, width, height);

    let frame = load_frame(image, info.protocol, width, height, rotation)
        .with_context(|| format!("Failed to load image {:?}", image))?;

    println!("📤 Sending {} bytes...", frame.len());
    lock(&driver)
        .send_frame(&frame, width, height)
        .context("Failed to send frame")?;

    println!("✅ Image displayed!");
    Ok(())
}

fn cmd_play(target: &DeviceTarget, animation: &Path, once: bool) -> Result<()> {
    let container = AnimationContainer::read_file(animation)
        .with_context(|| format!("Failed to read {:?}", animation))?;
    if container.is_empty() {
        bail!("{:?} contains no frames", animation);
    }

    let registry = DeviceRegistry::system();
    let (desc, driver) = open(&registry, target)?;
    let info = handshake_ok(&driver)?;
    let (width, height) = lcd_resolution(&info)?;
    let order = byte_order_for(info.protocol, width, height);

    println!(
        "🎞️  Decoding {} frames for {} at {}x{}...",
        container.len(),
        desc,
        width,
        height
    );
    let frames = container
        .decode_frames(Some((width, height)))
        .context("Failed to decode animation")?;

    let mut player = AnimationPlayer::new(frames);
    player.set_looping(!once);
    player.play();

    let running = ctrlc_flag()?;
    println!("▶️  Playing (Ctrl+C to stop)");

    let mut sent: u64 = 0;
    while running.load(Ordering::SeqCst) {
        let Some(frame) = player.next_frame() else {
            break;
        };
        let pixels = encode_rgb565(&frame.rgb, order);
        let delay = Duration::from_millis(frame.delay_ms as u64);

        if let Err(e) = lock(&driver).send_frame(&pixels, width, height) {
            eprintln!("⚠️  Frame {} failed: {}", player.position(), e);
        } else {
            sent += 1;
        }
        std::thread::sleep(delay);
    }

    println!("\n👋 Stopped after {} frames.", sent);
    Ok(())
}

fn cmd_led(target: &DeviceTarget, color: Option<&str>, brightness: u8) -> Result<()> {
    let solid = color.map(parse_hex_color).transpose()?;
    let registry = DeviceRegistry::system();
    let (desc, driver) = open(&registry, target)?;

    let info = handshake_ok(&driver)?;
    if !info.protocol.is_led() {
        bail!("{} is not an LED controller", desc);
    }
    if let Some(style) = &info.led_style {
        println!("💡 {} ({})", style.model_name(), desc);
    }

    if let Some((r, g, b)) = solid {
        let mut guard = lock(&driver);
        if let Some(led) = guard.as_led_mut() {
            led.set_brightness(brightness);
            led.send_solid([r, g, b])?;
        } else if let Some(kvm) = guard.as_kvm_led_mut() {
            let triples: Vec<u8> = std::iter::repeat_n([r, g, b], KVM_CHANNELS).flatten().collect();
            kvm.send_frame(&triples, KVM_CHANNELS as u32, 1)?;
        }
        println!("✅ Color #{:02X}{:02X}{:02X} applied", r, g, b);
        return Ok(());
    }

    let running = ctrlc_flag()?;
    println!("🌈 Rainbow (Ctrl+C to stop)");
    let mut phase = 0usize;
    while running.load(Ordering::SeqCst) {
        {
            let mut guard = lock(&driver);
            match guard.as_led_mut() {
                Some(led) => {
                    led.set_brightness(brightness);
                    led.send_rainbow(phase)?;
                }
                None => bail!("Rainbow mode needs an ARGB LED controller"),
            }
        }
        phase = phase.wrapping_add(4);
        std::thread::sleep(Duration::from_millis(20));
    }

    println!("\n👋 Stopped.");
    Ok(())
}

fn cmd_inspect_theme(path: &Path) -> Result<()> {
    let theme =
        ThemeContainer::read_file(path).with_context(|| format!("Failed to read {:?}", path))?;

    println!("🎨 Theme {:?}", path);
    println!(
        "{}",
        serde_json::to_string_pretty(&theme.layout).context("Failed to format layout")?
    );

    println!("\nElements ({}):", theme.elements.len());
    for (i, el) in theme.elements.iter().enumerate() {
        let [a, r, g, b] = el.color;
        println!(
            "  [{:2}] mode {}/{} at ({}, {}) font {:?} {:.1} #{:02X}{:02X}{:02X}{:02X} {:?}",
            i, el.mode, el.mode_sub, el.x, el.y, el.font_name, el.font_size, a, r, g, b, el.text
        );
    }

    let size = |blob: &Option<Vec<u8>>| blob.as_ref().map_or(0, Vec::len);
    println!("\nBackground: {} bytes", size(&theme.background));
    println!("Mask:       {} bytes", size(&theme.mask));
    match &theme.animation {
        Some(anim) => println!(
            "Animation:  {} frames, {} ms",
            anim.len(),
            anim.duration_ms()
        ),
        None => println!("Animation:  none"),
    }
    Ok(())
}

fn cmd_inspect_animation(path: &Path) -> Result<()> {
    let anim = AnimationContainer::read_file(path)
        .with_context(|| format!("Failed to read {:?}", path))?;

    println!("🎞️  {:?}: {} frames, {} ms total", path, anim.len(), anim.duration_ms());
    for (i, ((ts, frame), delay)) in anim
        .timestamps()
        .iter()
        .zip(anim.frames())
        .zip(anim.delays())
        .enumerate()
    {
        println!(
            "  #{:<4} t={:>7} ms  delay={:>4} ms  {:>7} bytes",
            i,
            ts,
            delay,
            frame.len()
        );
    }
    Ok(())
}

fn cmd_color_table(step: usize) -> Result<()> {
    let step = step.max(1);
    let table = generate_rainbow_table();

    println!("Rainbow ({} entries, every {}):", table.len(), step);
    for (i, [r, g, b]) in table.iter().enumerate().step_by(step) {
        println!("  {:>3}: #{:02X}{:02X}{:02X}", i, r, g, b);
    }

    println!("\nTemperature gradient:");
    for value in (20..=100).step_by(10) {
        let [r, g, b] = color_for_value(value as f32, &TEMP_GRADIENT);
        println!("  {:>3}°C: #{:02X}{:02X}{:02X}", value, r, g, b);
    }

    Ok(())
}
