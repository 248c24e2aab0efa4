//! # Joystick console line protocol
//!
//! The console's microcontroller sends one ASCII line per event: a command
//! word followed by comma-separated signed integers, eg: `X-8`, `P1,3`.
//!
//! Command | Arguments | Meaning
//! ------- | --------- | -------
//! `X`, `Y`, `Z` | position | Joystick axis position, `-16..=16`
//! `P`, `R` | row, column | Button press or release
//! `BOOT` | rest x/y/z, step x/y/z | Console started with this calibration
//! `LRN` | raw x/y/z, min x/y/z, max x/y/z | Calibration in progress
//! `HOME` | | Calibration is learning the rest position
//! `FIN` | rest x/y/z, step x/y/z | Calibration finished
//!
//! The host greets the console with [HELLO] after opening the port.
use crate::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;

pub const HELLO: &[u8] = b"HELLO\n";

/// Joystick steps in each direction from rest.
pub const JOYSTICK_STEPS: i32 = 16;

/// Buttons per keypad row.
pub const BUTTON_COLUMNS: i32 = 8;

lazy_static! {
    static ref LINE: std::result::Result<Regex, regex::Error> =
        Regex::new(r"(?P<command>[A-Z]+)(?P<args>-?[0-9]+(?:,-?[0-9]+){0,8})?");
}

/// Joystick axis.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Axis {
    /// Pan; positive is right.
    X,
    /// Tilt; positive is up.
    Y,
    /// Zoom; positive is tele.
    Z,
}

impl Axis {
    /// Fastest camera speed for this axis.
    pub const fn max_speed(&self) -> i32 {
        match self {
            Self::X => 18,
            Self::Y => 17,
            Self::Z => 7,
        }
    }

    /// Rescales a joystick position to a signed camera speed, rounding
    /// towards zero. Positions beyond [JOYSTICK_STEPS] are clamped.
    pub const fn speed(&self, position: i32) -> i32 {
        let position = if position > JOYSTICK_STEPS {
            JOYSTICK_STEPS
        } else if position < -JOYSTICK_STEPS {
            -JOYSTICK_STEPS
        } else {
            position
        };
        position * self.max_speed() / JOYSTICK_STEPS
    }
}

/// Joystick rest position and step size per axis.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct Calibration {
    pub rest: [i32; 3],
    pub step: [i32; 3],
}

/// Live joystick readings while calibrating.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct LearnReading {
    pub raw: [i32; 3],
    pub min: [i32; 3],
    pub max: [i32; 3],
}

impl std::fmt::Display for LearnReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [x, y, z] = self.raw;
        let [min_x, min_y, min_z] = self.min;
        let [max_x, max_y, max_z] = self.max;
        write!(
            f,
            "X:{x} Y:{y} Z:{z}\nminX:{min_x} minY:{min_y} minZ:{min_z}\nmaxX:{max_x} maxY:{max_y} maxZ:{max_z}"
        )
    }
}

/// A decoded console line.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ConsoleMessage {
    Axis { axis: Axis, position: i32 },
    ButtonPress { row: i32, column: i32 },
    ButtonRelease { row: i32, column: i32 },
    Boot(Calibration),
    Learn(LearnReading),
    Home,
    Finished(Calibration),
    /// A well-formed line with an unknown command word.
    Unknown(String),
}

fn triple(v: &[i32]) -> [i32; 3] {
    [v[0], v[1], v[2]]
}

impl ConsoleMessage {
    /// Parses one line from the console. Surrounding whitespace is ignored.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let pattern = LINE
            .as_ref()
            .map_err(|_| Error::MalformedLine(line.to_string()))?;
        let caps = pattern
            .captures(line)
            .ok_or_else(|| Error::MalformedLine(line.to_string()))?;

        let command = &caps["command"];
        let args = match caps.name("args") {
            Some(args) => args
                .as_str()
                .split(',')
                .map(|a| a.parse::<i32>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|_| Error::MalformedLine(line.to_string()))?,
            None => Vec::new(),
        };

        let expected = match command {
            "X" | "Y" | "Z" => 1,
            "P" | "R" => 2,
            "BOOT" | "FIN" => 6,
            "LRN" => 9,
            "HOME" => 0,
            _ => return Ok(Self::Unknown(line.to_string())),
        };
        if args.len() < expected {
            return Err(Error::MissingArgument {
                command: command.to_string(),
                expected,
                actual: args.len(),
            });
        }

        Ok(match command {
            "X" => Self::Axis {
                axis: Axis::X,
                position: args[0],
            },
            "Y" => Self::Axis {
                axis: Axis::Y,
                position: args[0],
            },
            "Z" => Self::Axis {
                axis: Axis::Z,
                position: args[0],
            },
            "P" => Self::ButtonPress {
                row: args[0],
                column: args[1],
            },
            "R" => Self::ButtonRelease {
                row: args[0],
                column: args[1],
            },
            "BOOT" => Self::Boot(Calibration {
                rest: triple(&args[0..3]),
                step: triple(&args[3..6]),
            }),
            "FIN" => Self::Finished(Calibration {
                rest: triple(&args[0..3]),
                step: triple(&args[3..6]),
            }),
            "LRN" => Self::Learn(LearnReading {
                raw: triple(&args[0..3]),
                min: triple(&args[3..6]),
                max: triple(&args[6..9]),
            }),
            _ => Self::Home,
        })
    }

    /// Linear index of the button in a press or release message.
    pub const fn button_index(&self) -> Option<i32> {
        match self {
            Self::ButtonPress { row, column } | Self::ButtonRelease { row, column } => {
                Some(*row * BUTTON_COLUMNS + *column)
            }
            _ => None,
        }
    }
}
