//! Example: Linearize the display and watch the button box.
//!
//! Runs against the mock device so no hardware is needed.
//!
//! Run with: `RUST_LOG=debug cargo run --example watch_buttons`

use std::time::Duration;

use pixx_core::{
    Button, CalibrationRecord, CalibrationSeries, DeviceSession, MockDevice, MockSurface,
    PixxConfig, PixxError, input_bits_from_buttons,
};

const CONFIG: &str = r#"
[display]
mode = "M16"

[response]
light_intensity = 0.8

[response.watch]
buttons = ["red", "green", "blue"]
"#;

fn main() -> Result<(), PixxError> {
    // Initialize logging (optional)
    env_logger::init();

    let device = MockDevice::new();
    let session = DeviceSession::open(device.clone())?;
    let config = PixxConfig::from_toml_str(CONFIG)?;
    let (mut display, mut buttons) = session.configure(MockSurface::new(), &config)?;

    let (width, height) = display.size()?;
    println!("Display: {}x{} in mode {}", width, height, display.mode()?);

    // A made-up gamma 2.2 calibration taken in the current state
    let levels: Vec<f64> = (0..=16).map(|i| f64::from(i) * 255.0 / 16.0).collect();
    let lums: Vec<f64> = levels.iter().map(|l| 0.4 + 110.0 * (l / 255.0).powf(2.2)).collect();
    let series = CalibrationSeries::new(levels, [lums.clone(), lums.clone(), lums.clone(), lums]);
    let record = CalibrationRecord::new("demo", series).with_register(display.register_snapshot()?);
    display.linearize(&record, true)?;
    println!("Linearized with {:?}", display.render_binding()?);

    println!("Lit buttons: {:?}", buttons.button_lights()?);
    buttons.start()?;

    // Simulated presses: red, then a red+blue chord, then release
    device.push_transition(0.512, Button::Red.input_code());
    device.push_transition(0.734, input_bits_from_buttons(&[Button::Red, Button::Blue]));
    device.push_transition(0.901, 0xFFFF);

    match buttons.wait_for_event(Some(Duration::from_millis(100)), false)? {
        Some(events) => {
            for event in events {
                println!("{:>6} {:<4} at {:.2}s", event.button, event.state, event.time);
            }
        }
        None => println!("No response"),
    }

    buttons.stop()?;
    Ok(())
}
