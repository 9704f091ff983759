//! Value types of the emulated controller
//!
//! Player slots, controller styles, capability tags, the button bitsets and
//! the report structures handed out by the accessors.

use serde::{Deserialize, Serialize};

use crate::input::motion::Vec3;
use crate::input::status::LedStatus;

/// Number of player configuration slots (eight players, handheld, other)
pub const PLAYER_SLOTS: usize = 10;

/// Logical player slot of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NpadIdType {
    Player1,
    Player2,
    Player3,
    Player4,
    Player5,
    Player6,
    Player7,
    Player8,
    Other,
    Handheld,
}

impl NpadIdType {
    /// All slots in settings-table order
    pub const ALL: [NpadIdType; PLAYER_SLOTS] = [
        NpadIdType::Player1,
        NpadIdType::Player2,
        NpadIdType::Player3,
        NpadIdType::Player4,
        NpadIdType::Player5,
        NpadIdType::Player6,
        NpadIdType::Player7,
        NpadIdType::Player8,
        NpadIdType::Handheld,
        NpadIdType::Other,
    ];

    /// Raw identifier used by the input service
    pub fn raw(&self) -> u32 {
        match self {
            NpadIdType::Player1 => 0,
            NpadIdType::Player2 => 1,
            NpadIdType::Player3 => 2,
            NpadIdType::Player4 => 3,
            NpadIdType::Player5 => 4,
            NpadIdType::Player6 => 5,
            NpadIdType::Player7 => 6,
            NpadIdType::Player8 => 7,
            NpadIdType::Other => 0x10,
            NpadIdType::Handheld => 0x20,
        }
    }

    /// Index into the player settings table
    pub fn index(&self) -> usize {
        match self {
            NpadIdType::Handheld => 8,
            NpadIdType::Other => 9,
            player => player.raw() as usize,
        }
    }

    /// Inverse of [`NpadIdType::index`]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.iter().copied().find(|id| id.index() == index)
    }

    /// LED pattern shown for this slot; non-player slots show nothing
    pub fn led_pattern(&self) -> LedPattern {
        match self {
            NpadIdType::Player1 => LedPattern::new(true, false, false, false),
            NpadIdType::Player2 => LedPattern::new(true, true, false, false),
            NpadIdType::Player3 => LedPattern::new(true, true, true, false),
            NpadIdType::Player4 => LedPattern::new(true, true, true, true),
            NpadIdType::Player5 => LedPattern::new(true, false, false, true),
            NpadIdType::Player6 => LedPattern::new(true, false, true, false),
            NpadIdType::Player7 => LedPattern::new(true, false, true, true),
            NpadIdType::Player8 => LedPattern::new(false, true, true, false),
            NpadIdType::Other | NpadIdType::Handheld => LedPattern::default(),
        }
    }
}

impl std::fmt::Display for NpadIdType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NpadIdType::Other => write!(f, "other"),
            NpadIdType::Handheld => write!(f, "handheld"),
            player => write!(f, "player{}", player.raw() + 1),
        }
    }
}

/// Physical style the controller presents as
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NpadStyleIndex {
    #[default]
    None,
    ProController,
    Handheld,
    JoyconDual,
    JoyconLeft,
    JoyconRight,
    GameCube,
    Pokeball,
    NES,
    SNES,
    N64,
    SegaGenesis,
}

impl NpadStyleIndex {
    /// Styles that present a full button set and may fall back to Pro
    pub fn is_fullkey_family(&self) -> bool {
        matches!(
            self,
            NpadStyleIndex::ProController
                | NpadStyleIndex::GameCube
                | NpadStyleIndex::NES
                | NpadStyleIndex::SNES
                | NpadStyleIndex::N64
                | NpadStyleIndex::SegaGenesis
        )
    }
}

/// Capability bitset: one flag per style the service accepts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NpadStyleTag(u32);

impl NpadStyleTag {
    pub const FULLKEY: u32 = 1 << 0;
    pub const HANDHELD: u32 = 1 << 1;
    pub const JOYCON_DUAL: u32 = 1 << 2;
    pub const JOYCON_LEFT: u32 = 1 << 3;
    pub const JOYCON_RIGHT: u32 = 1 << 4;
    pub const GAMECUBE: u32 = 1 << 5;
    pub const PALMA: u32 = 1 << 6;
    pub const LARK: u32 = 1 << 7;
    pub const HANDHELD_LARK: u32 = 1 << 8;
    pub const LUCIA: u32 = 1 << 9;
    pub const LAGOON: u32 = 1 << 10;
    pub const LAGER: u32 = 1 << 11;

    /// Every style flag set
    pub const fn all() -> Self {
        Self((1 << 12) - 1)
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    /// Flag of `style`; zero for [`NpadStyleIndex::None`]
    pub fn for_style(style: NpadStyleIndex) -> u32 {
        match style {
            NpadStyleIndex::ProController => Self::FULLKEY,
            NpadStyleIndex::Handheld => Self::HANDHELD,
            NpadStyleIndex::JoyconDual => Self::JOYCON_DUAL,
            NpadStyleIndex::JoyconLeft => Self::JOYCON_LEFT,
            NpadStyleIndex::JoyconRight => Self::JOYCON_RIGHT,
            NpadStyleIndex::GameCube => Self::GAMECUBE,
            NpadStyleIndex::Pokeball => Self::PALMA,
            NpadStyleIndex::NES => Self::LARK,
            NpadStyleIndex::SNES => Self::LUCIA,
            NpadStyleIndex::N64 => Self::LAGOON,
            NpadStyleIndex::SegaGenesis => Self::LAGER,
            NpadStyleIndex::None => 0,
        }
    }

    /// Whether `style` may be connected under this capability set
    pub fn supports(&self, style: NpadStyleIndex) -> bool {
        let flag = Self::for_style(style);
        flag != 0 && self.contains(flag)
    }
}

/// Bits of [`NpadButtonState`]
pub mod npad_button {
    pub const A: u64 = 1 << 0;
    pub const B: u64 = 1 << 1;
    pub const X: u64 = 1 << 2;
    pub const Y: u64 = 1 << 3;
    pub const STICK_L: u64 = 1 << 4;
    pub const STICK_R: u64 = 1 << 5;
    pub const L: u64 = 1 << 6;
    pub const R: u64 = 1 << 7;
    pub const ZL: u64 = 1 << 8;
    pub const ZR: u64 = 1 << 9;
    pub const PLUS: u64 = 1 << 10;
    pub const MINUS: u64 = 1 << 11;
    pub const LEFT: u64 = 1 << 12;
    pub const UP: u64 = 1 << 13;
    pub const RIGHT: u64 = 1 << 14;
    pub const DOWN: u64 = 1 << 15;
    pub const STICK_L_LEFT: u64 = 1 << 16;
    pub const STICK_L_UP: u64 = 1 << 17;
    pub const STICK_L_RIGHT: u64 = 1 << 18;
    pub const STICK_L_DOWN: u64 = 1 << 19;
    pub const STICK_R_LEFT: u64 = 1 << 20;
    pub const STICK_R_UP: u64 = 1 << 21;
    pub const STICK_R_RIGHT: u64 = 1 << 22;
    pub const STICK_R_DOWN: u64 = 1 << 23;
    pub const LEFT_SL: u64 = 1 << 24;
    pub const LEFT_SR: u64 = 1 << 25;
    pub const RIGHT_SL: u64 = 1 << 26;
    pub const RIGHT_SR: u64 = 1 << 27;
}

/// Bits of [`DebugPadButton`]
pub mod debug_pad_button {
    pub const A: u32 = 1 << 0;
    pub const B: u32 = 1 << 1;
    pub const X: u32 = 1 << 2;
    pub const Y: u32 = 1 << 3;
    pub const L: u32 = 1 << 4;
    pub const R: u32 = 1 << 5;
    pub const ZL: u32 = 1 << 6;
    pub const ZR: u32 = 1 << 7;
    pub const PLUS: u32 = 1 << 8;
    pub const MINUS: u32 = 1 << 9;
    pub const D_LEFT: u32 = 1 << 10;
    pub const D_UP: u32 = 1 << 11;
    pub const D_RIGHT: u32 = 1 << 12;
    pub const D_DOWN: u32 = 1 << 13;
}

/// Main controller button bitset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NpadButtonState(u64);

impl NpadButtonState {
    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn is_set(&self, bits: u64) -> bool {
        self.0 & bits == bits
    }

    pub fn assign(&mut self, bits: u64, value: bool) {
        if value {
            self.0 |= bits;
        } else {
            self.0 &= !bits;
        }
    }
}

/// Debug pad button bitset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebugPadButton(u32);

impl DebugPadButton {
    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn is_set(&self, bits: u32) -> bool {
        self.0 & bits == bits
    }

    pub fn assign(&mut self, bits: u32, value: bool) {
        if value {
            self.0 |= bits;
        } else {
            self.0 &= !bits;
        }
    }
}

/// Logical buttons in settings-table order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeButton {
    A,
    B,
    X,
    Y,
    LStick,
    RStick,
    L,
    R,
    ZL,
    ZR,
    Plus,
    Minus,
    DLeft,
    DUp,
    DRight,
    DDown,
    SL,
    SR,
    Home,
    Screenshot,
}

impl NativeButton {
    pub const COUNT: usize = 20;

    pub const ALL: [NativeButton; Self::COUNT] = [
        NativeButton::A,
        NativeButton::B,
        NativeButton::X,
        NativeButton::Y,
        NativeButton::LStick,
        NativeButton::RStick,
        NativeButton::L,
        NativeButton::R,
        NativeButton::ZL,
        NativeButton::ZR,
        NativeButton::Plus,
        NativeButton::Minus,
        NativeButton::DLeft,
        NativeButton::DUp,
        NativeButton::DRight,
        NativeButton::DDown,
        NativeButton::SL,
        NativeButton::SR,
        NativeButton::Home,
        NativeButton::Screenshot,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Bits driven in the main and debug bitsets
    ///
    /// Home and Screenshot drive neither; SL/SR drive both Joy-Con halves.
    pub fn report_bits(&self) -> (u64, u32) {
        use debug_pad_button as d;
        use npad_button as n;
        match self {
            NativeButton::A => (n::A, d::A),
            NativeButton::B => (n::B, d::B),
            NativeButton::X => (n::X, d::X),
            NativeButton::Y => (n::Y, d::Y),
            NativeButton::LStick => (n::STICK_L, 0),
            NativeButton::RStick => (n::STICK_R, 0),
            NativeButton::L => (n::L, d::L),
            NativeButton::R => (n::R, d::R),
            NativeButton::ZL => (n::ZL, d::ZL),
            NativeButton::ZR => (n::ZR, d::ZR),
            NativeButton::Plus => (n::PLUS, d::PLUS),
            NativeButton::Minus => (n::MINUS, d::MINUS),
            NativeButton::DLeft => (n::LEFT, d::D_LEFT),
            NativeButton::DUp => (n::UP, d::D_UP),
            NativeButton::DRight => (n::RIGHT, d::D_RIGHT),
            NativeButton::DDown => (n::DOWN, d::D_DOWN),
            NativeButton::SL => (n::LEFT_SL | n::RIGHT_SL, 0),
            NativeButton::SR => (n::LEFT_SR | n::RIGHT_SR, 0),
            NativeButton::Home | NativeButton::Screenshot => (0, 0),
        }
    }
}

/// Analog sticks in settings-table order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeAnalog {
    LStick,
    RStick,
}

impl NativeAnalog {
    pub const COUNT: usize = 2;
    pub const ALL: [NativeAnalog; Self::COUNT] = [NativeAnalog::LStick, NativeAnalog::RStick];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Left, up, right, down overlay bits
    pub fn direction_bits(&self) -> [u64; 4] {
        use npad_button as n;
        match self {
            NativeAnalog::LStick => [n::STICK_L_LEFT, n::STICK_L_UP, n::STICK_L_RIGHT, n::STICK_L_DOWN],
            NativeAnalog::RStick => [n::STICK_R_LEFT, n::STICK_R_UP, n::STICK_R_RIGHT, n::STICK_R_DOWN],
        }
    }
}

/// Number of motion inputs (left and right sensor)
pub const MOTION_COUNT: usize = 2;
/// Number of analog triggers (ZL, ZR)
pub const TRIGGER_COUNT: usize = 2;
/// Number of output channels (left and right rumble/LED)
pub const OUTPUT_COUNT: usize = 2;
/// Number of battery cells (left, right, dual)
pub const BATTERY_COUNT: usize = 3;

pub const LEFT_INDEX: usize = 0;
pub const RIGHT_INDEX: usize = 1;
pub const DUAL_INDEX: usize = 2;

/// Stick position in report units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalogStickState {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalogSticks {
    pub left: AnalogStickState,
    pub right: AnalogStickState,
}

/// Analog trigger positions in report units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpadGcTriggerState {
    pub left: i32,
    pub right: i32,
}

/// Integrated motion of one sensor
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerMotion {
    pub accel: Vec3,
    pub gyro: Vec3,
    pub rotation: Vec3,
    pub orientation: [Vec3; 3],
    pub is_at_rest: bool,
}

pub type MotionState = [ControllerMotion; MOTION_COUNT];

/// Power report of one battery cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpadPowerInfo {
    pub is_powered: bool,
    pub is_charging: bool,
    pub battery_level: u32,
}

impl Default for NpadPowerInfo {
    /// A cell that has never reported is shown as full
    fn default() -> Self {
        Self {
            is_powered: true,
            is_charging: false,
            battery_level: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryLevelState {
    pub dual: NpadPowerInfo,
    pub left: NpadPowerInfo,
    pub right: NpadPowerInfo,
}

/// Body and button color, `0xRRGGBB`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpadColor {
    pub body: u32,
    pub button: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerColors {
    pub fullkey: NpadColor,
    pub left: NpadColor,
    pub right: NpadColor,
}

/// Four player LEDs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedPattern {
    pub position1: bool,
    pub position2: bool,
    pub position3: bool,
    pub position4: bool,
}

impl LedPattern {
    pub const fn new(position1: bool, position2: bool, position3: bool, position4: bool) -> Self {
        Self {
            position1,
            position2,
            position3,
            position4,
        }
    }

    /// Compact `1000` style rendering for listings
    pub fn as_bits(&self) -> String {
        [self.position1, self.position2, self.position3, self.position4]
            .iter()
            .map(|on| if *on { '1' } else { '0' })
            .collect()
    }
}

impl From<LedPattern> for LedStatus {
    fn from(pattern: LedPattern) -> Self {
        LedStatus {
            led_1: pattern.position1,
            led_2: pattern.position2,
            led_3: pattern.position3,
            led_4: pattern.position4,
        }
    }
}

/// Vibration request from the consumer side
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VibrationValue {
    pub low_amplitude: f32,
    pub low_frequency: f32,
    pub high_amplitude: f32,
    pub high_frequency: f32,
}

impl VibrationValue {
    /// Motors stopped at their resting frequencies
    pub const DEFAULT: VibrationValue = VibrationValue {
        low_amplitude: 0.0,
        low_frequency: 160.0,
        high_amplitude: 0.0,
        high_frequency: 320.0,
    };

    /// Imperceptible pulse used to probe rumble support
    pub const TEST_PULSE: VibrationValue = VibrationValue {
        low_amplitude: 0.001,
        low_frequency: 160.0,
        high_amplitude: 0.001,
        high_frequency: 320.0,
    };
}

impl Default for VibrationValue {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// What changed, as reported to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerTriggerType {
    Button,
    Stick,
    Trigger,
    Motion,
    Color,
    Battery,
    Vibration,
    Connected,
    Disconnected,
    Type,
    All,
}
