//! Per-board power behavior
//!
//! Boards are grouped into families sharing step functions. Delays are the
//! calibrated values each board needs; they are not tunable from config
//! except through [`PowerTiming`](super::PowerTiming).

use std::time::Duration;

use super::{BoardPower, PowerSequencer, RecMode};
use crate::config::Direction;
use crate::drivers::unsupported;
use crate::error::DriverError;

const HOSTEVENT_KEYBOARD_RECOVERY: &str = "hostevent set 0x4000";
/// Hold time of the veyron power key
const VEYRON_KEY_HOLD: Duration = Duration::from_millis(700);

type StepResult = Result<(), DriverError>;

// Shared steps

fn cold_reset_pulse(seq: &PowerSequencer<'_>) -> StepResult {
    seq.cold_reset_pulse()
}

fn short_press(seq: &PowerSequencer<'_>) -> StepResult {
    seq.short_press()
}

fn long_press(seq: &PowerSequencer<'_>) -> StepResult {
    seq.long_press()
}

/// Reset the EC and come back up in normal mode
fn reset_then_power_on(seq: &PowerSequencer<'_>) -> StepResult {
    seq.cold_reset()?;
    seq.power_on(RecMode::Off)
}

/// For boards whose power-on goes through the reset cycle itself
fn reset_only(seq: &PowerSequencer<'_>) -> StepResult {
    seq.cold_reset()
}

fn hold_cold_reset(seq: &PowerSequencer<'_>) -> StepResult {
    seq.set("cold_reset", "on")
}

fn no_power_on(seq: &PowerSequencer<'_>, _rec: RecMode) -> StepResult {
    Err(unsupported(Direction::Set, format!("{} power on", seq.board().name)))
}

fn no_reset_cycle(seq: &PowerSequencer<'_>) -> StepResult {
    Err(unsupported(Direction::Set, format!("{} reset cycle", seq.board().name)))
}

// EC console boards

fn ec_shutdown(seq: &PowerSequencer<'_>) -> StepResult {
    seq.set("ec_uart_regexp", "None")?;
    seq.ec_command(&seq.timing().shutdown_ec_command)?;
    seq.sleep(seq.timing().shutdown_delay);
    Ok(())
}

/// Recovery through an EC host event with the AP held off
fn softrec_on(seq: &PowerSequencer<'_>, rec: RecMode) -> StepResult {
    if rec == RecMode::On {
        seq.set("warm_reset", "on")?;
        seq.cold_reset()?;
        seq.ec_command("reboot ap-off")?;
        seq.sleep(seq.timing().reset_recovery);
        seq.set("warm_reset", "off")?;
        seq.ec_command(HOSTEVENT_KEYBOARD_RECOVERY)?;
        seq.sleep(seq.board().recovery_delay);
    }
    seq.power_on_ap()
}

/// Recovery through the `rec_mode` strap latched at cold reset
fn hardrec_on(seq: &PowerSequencer<'_>, rec: RecMode) -> StepResult {
    if rec == RecMode::On {
        seq.set_rec_mode(RecMode::On)?;
        seq.sleep(seq.board().recovery_delay);
        seq.cold_reset()?;
        seq.sleep(seq.board().recovery_delay);
        seq.set_rec_mode(RecMode::Off)
    } else {
        seq.short_press()
    }
}

/// Recovery host event sent while the AP is held off after a reset
fn arm_on(seq: &PowerSequencer<'_>, rec: RecMode) -> StepResult {
    if rec == RecMode::On {
        seq.cold_reset()?;
        seq.ec_command("reboot ap-off")?;
        seq.sleep(seq.board().recovery_delay);
        seq.ec_command(HOSTEVENT_KEYBOARD_RECOVERY)?;
    }
    seq.short_press()
}

fn pd_cold_reset(seq: &PowerSequencer<'_>) -> StepResult {
    seq.set("cold_reset", "on")?;
    seq.set("usbpd_reset", "on")?;
    seq.sleep(seq.timing().reset_hold);
    seq.set("usbpd_reset", "off")?;
    seq.set("cold_reset", "off")?;
    seq.sleep(seq.timing().reset_recovery);
    Ok(())
}

/// Run `cmd` waiting for `pattern`, then clear the pattern whatever happened
fn ec_command_expect(seq: &PowerSequencer<'_>, pattern: &str, cmd: &str) -> StepResult {
    let sent = seq
        .set("ec_uart_regexp", pattern)
        .and_then(|()| seq.ec_command(cmd));
    let cleared = seq.set("ec_uart_regexp", "None");
    sent.and(cleared)
}

fn pd_softrec_on(seq: &PowerSequencer<'_>, rec: RecMode) -> StepResult {
    let rec_screen = seq.timing().boot_to_rec_screen_delay;
    if rec == RecMode::On {
        // Reboot the EC to RO with the AP off, holding the PD MCU in reset
        seq.set("usbpd_reset", "on")?;
        seq.cold_reset_pulse()?;
        ec_command_expect(seq, "['Reset cause:']", "reboot ap-off")?;
        seq.sleep(seq.timing().reset_recovery);
        seq.set("usbpd_reset", "off")?;

        // Software sync of the PD MCU fails on the first boot, which
        // records the recovery reason; boot again to reach the screen
        ec_command_expect(seq, "['Events:']", HOSTEVENT_KEYBOARD_RECOVERY)?;
        seq.power_on_ap()?;
        seq.sleep(rec_screen);
        seq.power_off()?;
        ec_command_expect(seq, "['Events:']", HOSTEVENT_KEYBOARD_RECOVERY)?;
    }
    seq.power_on_ap()?;
    if rec == RecMode::On {
        seq.sleep(rec_screen);
    }
    Ok(())
}

fn samus_cold_reset(seq: &PowerSequencer<'_>) -> StepResult {
    seq.set("cold_reset", "on")?;
    seq.set("usbpd_reset", "on")?;
    seq.sleep(seq.timing().reset_hold);
    seq.set("cold_reset", "off")?;
    seq.set("usbpd_reset", "off")?;
    seq.sleep(seq.timing().reset_recovery);
    Ok(())
}

fn nyan_reset_cycle(seq: &PowerSequencer<'_>) -> StepResult {
    seq.cold_reset()?;
    seq.set("warm_reset", "on")?;
    seq.sleep(seq.timing().reset_hold);
    seq.set("warm_reset", "off")
}

fn veyron_power_on_ap(seq: &PowerSequencer<'_>) -> StepResult {
    seq.set("ec_uart_regexp", "None")?;
    seq.ec_command("power on")
}

fn kitty_off(seq: &PowerSequencer<'_>) -> StepResult {
    seq.power_key(Duration::from_secs(10))
}

// x86 boards with a recovery strap

fn alex_on(seq: &PowerSequencer<'_>, rec: RecMode) -> StepResult {
    seq.set_rec_mode(rec)?;
    seq.short_press()?;
    if rec == RecMode::On {
        seq.sleep(seq.board().recovery_delay);
        seq.set_rec_mode(RecMode::Off)?;
    }
    Ok(())
}

fn stumpy_off(seq: &PowerSequencer<'_>) -> StepResult {
    seq.cold_reset()?;
    seq.cold_reset()
}

fn link_off(seq: &PowerSequencer<'_>) -> StepResult {
    seq.ec_command("x86shutdown")
}

fn link_on(seq: &PowerSequencer<'_>, rec: RecMode) -> StepResult {
    if rec == RecMode::On {
        seq.set_rec_mode(RecMode::On)?;
        seq.cold_reset()?;
        seq.sleep(seq.board().recovery_delay);
        seq.set_rec_mode(RecMode::Off)
    } else {
        seq.short_press()
    }
}

fn daisy_off(seq: &PowerSequencer<'_>) -> StepResult {
    seq.cold_reset()?;
    seq.sleep(seq.board().recovery_delay);
    seq.long_press()
}

/// Parrot's EC only honors cold reset while the power button is held
fn parrot_cold_reset(seq: &PowerSequencer<'_>) -> StepResult {
    seq.set("pwr_button", "press")?;
    seq.cold_reset_pulse()?;
    seq.set("pwr_button", "release")
}

fn parrot_off(seq: &PowerSequencer<'_>) -> StepResult {
    seq.cold_reset()?;
    seq.sleep(Duration::from_secs(4));
    seq.short_press()
}

fn parrot_on(seq: &PowerSequencer<'_>, rec: RecMode) -> StepResult {
    seq.short_press()?;
    seq.sleep(Duration::from_millis(750));
    seq.set_rec_mode(rec)?;
    seq.cold_reset()
}

fn beltino_reset_cycle(seq: &PowerSequencer<'_>) -> StepResult {
    seq.cold_reset()?;
    seq.short_press()
}

fn beltino_on(seq: &PowerSequencer<'_>, rec: RecMode) -> StepResult {
    if rec == RecMode::On {
        seq.set_rec_mode(RecMode::On)?;
        seq.sleep(seq.board().recovery_delay);
        seq.reset_cycle()?;
        seq.sleep(seq.board().recovery_delay);
        seq.set_rec_mode(RecMode::Off)
    } else {
        seq.short_press()
    }
}

// Boards that boot straight out of reset

/// Latch recovery across a reset cycle
fn rec_through_reset(seq: &PowerSequencer<'_>) -> StepResult {
    seq.set_rec_mode(RecMode::On)?;
    seq.reset_cycle()?;
    seq.sleep(seq.board().recovery_delay);
    seq.set_rec_mode(RecMode::Off)
}

fn strap_cycle_on(seq: &PowerSequencer<'_>, rec: RecMode) -> StepResult {
    if rec == RecMode::On {
        rec_through_reset(seq)
    } else {
        seq.set_rec_mode(RecMode::Off)?;
        seq.sleep(seq.board().recovery_delay);
        seq.reset_cycle()
    }
}

fn chromebox_off(seq: &PowerSequencer<'_>) -> StepResult {
    seq.set("cold_reset", "on")?;
    seq.sleep(Duration::from_secs(1));
    Ok(())
}

fn chromebox_on(seq: &PowerSequencer<'_>, rec: RecMode) -> StepResult {
    if rec == RecMode::On {
        rec_through_reset(seq)
    } else {
        seq.set_rec_mode(RecMode::Off)?;
        seq.set("cold_reset", "off")?;
        seq.power_key(VEYRON_KEY_HOLD)
    }
}

fn mickey_reset_cycle(seq: &PowerSequencer<'_>) -> StepResult {
    seq.cold_reset()?;
    seq.power_key(VEYRON_KEY_HOLD)
}

fn mickey_on(seq: &PowerSequencer<'_>, rec: RecMode) -> StepResult {
    if rec == RecMode::On {
        rec_through_reset(seq)
    } else {
        seq.set_rec_mode(RecMode::Off)?;
        seq.power_key(VEYRON_KEY_HOLD)
    }
}

fn rialto_on(seq: &PowerSequencer<'_>, rec: RecMode) -> StepResult {
    if rec == RecMode::On {
        rec_through_reset(seq)
    } else {
        seq.set_rec_mode(RecMode::Off)?;
        seq.set("cold_reset", "off")
    }
}

const fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

/// EC shutdown only; power on is left to a more specific board
pub static CROS_EC: BoardPower = BoardPower {
    name: "cros_ec_power",
    power_off: ec_shutdown,
    power_on: no_power_on,
    reset_cycle: reset_only,
    cold_reset: cold_reset_pulse,
    power_on_ap: short_press,
    recovery_delay: millis(0),
};

pub static CROS_EC_SOFTREC: BoardPower = SOFTREC_FAMILY;

pub static CROS_EC_HARDREC: BoardPower = BoardPower {
    name: "cros_ec_hardrec_power",
    power_off: ec_shutdown,
    power_on: hardrec_on,
    reset_cycle: reset_then_power_on,
    cold_reset: cold_reset_pulse,
    power_on_ap: short_press,
    recovery_delay: millis(2500),
};

pub static CROS_EC_PD_SOFTREC: BoardPower = BoardPower {
    name: "cros_ec_pd_softrec_power",
    power_off: ec_shutdown,
    power_on: pd_softrec_on,
    reset_cycle: reset_then_power_on,
    cold_reset: pd_cold_reset,
    power_on_ap: short_press,
    recovery_delay: millis(1000),
};

pub static CROS_EC_ARM: BoardPower = BoardPower {
    name: "cros_ec_power_arm",
    power_off: ec_shutdown,
    power_on: arm_on,
    reset_cycle: reset_then_power_on,
    cold_reset: cold_reset_pulse,
    power_on_ap: short_press,
    recovery_delay: millis(400),
};

pub static CROS_EC_X86: BoardPower = BoardPower {
    name: "cros_ec_power_x86",
    power_off: ec_shutdown,
    power_on: hardrec_on,
    reset_cycle: reset_then_power_on,
    cold_reset: cold_reset_pulse,
    power_on_ap: short_press,
    recovery_delay: millis(2500),
};

pub static ALEX: BoardPower = ALEX_FAMILY;

pub static STUMPY: BoardPower = BoardPower {
    name: "stumpy_power",
    power_off: stumpy_off,
    ..ALEX_FAMILY
};

/// Lumpy can't be power cycled through cold reset
pub static LUMPY: BoardPower = BoardPower {
    name: "lumpy_power",
    power_off: long_press,
    reset_cycle: no_reset_cycle,
    ..ALEX_FAMILY
};

const ALEX_FAMILY: BoardPower = BoardPower {
    name: "alex_power",
    power_off: cold_reset_pulse,
    power_on: alex_on,
    reset_cycle: reset_then_power_on,
    cold_reset: cold_reset_pulse,
    power_on_ap: short_press,
    recovery_delay: millis(10_000),
};

pub static LINK: BoardPower = BoardPower {
    name: "link_power",
    power_off: link_off,
    power_on: link_on,
    reset_cycle: reset_then_power_on,
    cold_reset: cold_reset_pulse,
    power_on_ap: short_press,
    recovery_delay: millis(2500),
};

pub static DAISY: BoardPower = BoardPower {
    name: "daisy_power",
    power_off: daisy_off,
    power_on: arm_on,
    reset_cycle: reset_then_power_on,
    cold_reset: cold_reset_pulse,
    power_on_ap: short_press,
    recovery_delay: millis(400),
};

pub static PARROT: BoardPower = BoardPower {
    name: "parrot_power",
    power_off: parrot_off,
    power_on: parrot_on,
    reset_cycle: reset_then_power_on,
    cold_reset: parrot_cold_reset,
    power_on_ap: short_press,
    recovery_delay: millis(0),
};

pub static STORM: BoardPower = STORM_FAMILY;

pub static GALE: BoardPower = BoardPower {
    name: "gale_power",
    recovery_delay: millis(38_000),
    ..STORM_FAMILY
};

const STORM_FAMILY: BoardPower = BoardPower {
    name: "storm_power",
    power_off: hold_cold_reset,
    power_on: strap_cycle_on,
    reset_cycle: reset_only,
    cold_reset: cold_reset_pulse,
    power_on_ap: short_press,
    recovery_delay: millis(20_000),
};

pub static BELTINO: BoardPower = BoardPower {
    name: "beltino_power",
    power_off: long_press,
    power_on: beltino_on,
    reset_cycle: beltino_reset_cycle,
    cold_reset: cold_reset_pulse,
    power_on_ap: short_press,
    recovery_delay: millis(2500),
};

pub static KITTY: BoardPower = BoardPower {
    name: "kitty_power",
    power_off: kitty_off,
    power_on: hardrec_on,
    reset_cycle: reset_then_power_on,
    cold_reset: cold_reset_pulse,
    power_on_ap: short_press,
    recovery_delay: millis(2500),
};

pub static NYAN: BoardPower = BoardPower {
    name: "nyan_power",
    reset_cycle: nyan_reset_cycle,
    ..SOFTREC_FAMILY
};

pub static SAMUS: BoardPower = BoardPower {
    name: "samus_power",
    cold_reset: samus_cold_reset,
    ..SOFTREC_FAMILY
};

pub static VEYRON: BoardPower = BoardPower {
    name: "veyron_power",
    power_on_ap: veyron_power_on_ap,
    ..SOFTREC_FAMILY
};

const SOFTREC_FAMILY: BoardPower = BoardPower {
    name: "cros_ec_softrec_power",
    power_off: ec_shutdown,
    power_on: softrec_on,
    reset_cycle: reset_then_power_on,
    cold_reset: cold_reset_pulse,
    power_on_ap: short_press,
    recovery_delay: millis(1000),
};

pub static VEYRON_CHROMEBOX: BoardPower = BoardPower {
    name: "veyron_chromebox_power",
    power_off: chromebox_off,
    power_on: chromebox_on,
    reset_cycle: reset_only,
    cold_reset: cold_reset_pulse,
    power_on_ap: short_press,
    recovery_delay: millis(2500),
};

pub static VEYRON_MICKEY: BoardPower = BoardPower {
    name: "veyron_mickey_power",
    power_off: cold_reset_pulse,
    power_on: mickey_on,
    reset_cycle: mickey_reset_cycle,
    cold_reset: cold_reset_pulse,
    power_on_ap: short_press,
    recovery_delay: millis(2500),
};

pub static VEYRON_RIALTO: BoardPower = BoardPower {
    name: "veyron_rialto_power",
    power_off: hold_cold_reset,
    power_on: rialto_on,
    reset_cycle: reset_only,
    cold_reset: cold_reset_pulse,
    power_on_ap: short_press,
    recovery_delay: millis(2500),
};

/// Every board, looked up by `drv` name
pub static ALL: [&BoardPower; 22] = [
    &CROS_EC,
    &CROS_EC_SOFTREC,
    &CROS_EC_HARDREC,
    &CROS_EC_PD_SOFTREC,
    &CROS_EC_ARM,
    &CROS_EC_X86,
    &ALEX,
    &STUMPY,
    &LUMPY,
    &LINK,
    &DAISY,
    &PARROT,
    &STORM,
    &GALE,
    &BELTINO,
    &KITTY,
    &NYAN,
    &SAMUS,
    &VEYRON,
    &VEYRON_CHROMEBOX,
    &VEYRON_MICKEY,
    &VEYRON_RIALTO,
];

pub fn find(name: &str) -> Option<&'static BoardPower> {
    ALL.iter().copied().find(|b| b.name == name)
}
