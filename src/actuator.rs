//! Actuator command handling: typed command parsing, value clamping, and
//! the drive state machine.
//!
//! Commands arrive as a `(variable, value)` pair from the control endpoint.
//! Numeric values are clamped to each variable's valid range before use.
//! Drive commands go through a small state machine whose turning behavior
//! depends on the last commanded direction: turning while driving keeps one
//! side powered in the prior polarity (asymmetric pivot, avoids reversing
//! drive polarity mid-turn), turning from standstill spins in place.
//!
//! All side effects are PWM duty writes through [`PwmBackend`]; nothing
//! reports actuator success back, so a command only fails when it cannot be
//! interpreted.

use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::sensor::{FrameSize, SensorControl};
use crate::{PixelFormat, Result, RoverError};

/// PWM output channels, numbered as wired on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PwmChannel {
    /// Right motor, reverse polarity.
    RightRev,
    /// Right motor, forward polarity.
    RightFwd,
    /// Left motor, forward polarity.
    LeftFwd,
    /// Left motor, reverse polarity.
    LeftRev,
    /// Auxiliary light.
    Flash,
    /// Steering servo.
    Servo,
    /// Camera pan servo.
    ServoPan,
    /// Third servo header.
    ServoAux,
}

impl PwmChannel {
    /// The four drive-motor channels.
    pub const MOTORS: [PwmChannel; 4] =
        [PwmChannel::RightRev, PwmChannel::RightFwd, PwmChannel::LeftFwd, PwmChannel::LeftRev];

    /// Hardware channel number.
    pub fn id(self) -> u8 {
        match self {
            PwmChannel::RightRev => 3,
            PwmChannel::RightFwd => 4,
            PwmChannel::LeftFwd => 5,
            PwmChannel::LeftRev => 6,
            PwmChannel::Flash => 7,
            PwmChannel::Servo => 8,
            PwmChannel::ServoPan => 9,
            PwmChannel::ServoAux => 10,
        }
    }
}

/// Trait for the PWM duty-write primitive.
///
/// Implementations wrap the real peripheral (or log, or record for tests).
/// Writes are fire-and-forget: the hardware offers no success signal.
pub trait PwmBackend: Send + Sync {
    /// Set the duty cycle of one channel.
    fn write_duty(&mut self, channel: PwmChannel, duty: u32);
}

/// Control variables accepted by the command endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    FrameSize,
    Quality,
    Flash,
    Speed,
    NoStop,
    Servo,
    ServoPan,
    ServoAux,
    Car,
}

impl FromStr for Variable {
    type Err = RoverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "framesize" => Ok(Variable::FrameSize),
            "quality" => Ok(Variable::Quality),
            "flash" => Ok(Variable::Flash),
            "speed" => Ok(Variable::Speed),
            "nostop" => Ok(Variable::NoStop),
            "servo" => Ok(Variable::Servo),
            "servopan" => Ok(Variable::ServoPan),
            "servo3" => Ok(Variable::ServoAux),
            "car" => Ok(Variable::Car),
            other => Err(RoverError::unknown_variable(other)),
        }
    }
}

/// Drive commands carried by the `car` variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarAction {
    Forward,
    TurnLeft,
    Stop,
    TurnRight,
    Backward,
}

impl CarAction {
    /// Decode the wire value; anything outside 1..=5 is a no-op.
    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            1 => Some(CarAction::Forward),
            2 => Some(CarAction::TurnLeft),
            3 => Some(CarAction::Stop),
            4 => Some(CarAction::TurnRight),
            5 => Some(CarAction::Backward),
            _ => None,
        }
    }
}

/// Last commanded drive direction; decides how turns are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveDirection {
    Forward,
    Reverse,
    #[default]
    Stopped,
}

/// Pauses after directional commands, letting physical actuation happen
/// before the self-stop pulse ends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettleDelays {
    /// After Forward/Backward.
    pub drive: Duration,
    /// After TurnLeft/TurnRight.
    pub turn: Duration,
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self { drive: Duration::from_millis(200), turn: Duration::from_millis(100) }
    }
}

impl SettleDelays {
    /// No pauses; used by tests.
    pub fn none() -> Self {
        Self { drive: Duration::ZERO, turn: Duration::ZERO }
    }
}

/// Servo duty range on the wire, before the x10 scaling.
const SERVO_MIN: i64 = 325;
const SERVO_MAX: i64 = 650;

/// The actuator state machine.
///
/// Owns the drive direction, speed setting, and no-stop flag that persist
/// across requests, in one state object the server serializes commands
/// through.
pub struct Actuator {
    pwm: Box<dyn PwmBackend>,
    drive: DriveDirection,
    speed: u32,
    no_stop: bool,
    settle: SettleDelays,
}

impl Actuator {
    /// Create an actuator over the given PWM backend.
    ///
    /// Boot state: stopped, full speed (255), self-stopping pulses.
    pub fn new(pwm: Box<dyn PwmBackend>) -> Self {
        Self {
            pwm,
            drive: DriveDirection::Stopped,
            speed: 255,
            no_stop: false,
            settle: SettleDelays::default(),
        }
    }

    /// Override the settle delays (tests use [`SettleDelays::none`]).
    pub fn with_settle_delays(mut self, settle: SettleDelays) -> Self {
        self.settle = settle;
        self
    }

    /// Last commanded drive direction.
    pub fn drive_direction(&self) -> DriveDirection {
        self.drive
    }

    /// Current speed setting (0–255).
    pub fn speed(&self) -> u32 {
        self.speed
    }

    /// Whether motion persists after a drive command.
    pub fn no_stop(&self) -> bool {
        self.no_stop
    }

    /// Apply one parsed command.
    ///
    /// Sensor-directed variables lock `sensor` briefly and never await while
    /// holding it; drive commands await their settle delay. Returns an error
    /// only when the sensor rejects a value; actuator writes cannot fail.
    pub async fn apply(
        &mut self,
        variable: Variable,
        value: i64,
        sensor: &Mutex<dyn SensorControl>,
    ) -> Result<()> {
        match variable {
            Variable::FrameSize => {
                let mut sensor = lock_sensor(sensor);
                // resolution changes only make sense while the sensor
                // outputs JPEG
                if sensor.pixel_format() == PixelFormat::Jpeg {
                    let size = FrameSize::from_index(value).ok_or_else(|| {
                        RoverError::sensor("framesize", format!("no frame size with index {value}"))
                    })?;
                    sensor.set_frame_size(size)?;
                }
                Ok(())
            }
            Variable::Quality => {
                let mut sensor = lock_sensor(sensor);
                sensor.set_quality(value)
            }
            Variable::Flash => {
                let duty = value.clamp(0, 255) as u32;
                self.pwm.write_duty(PwmChannel::Flash, duty);
                Ok(())
            }
            Variable::Speed => {
                self.speed = value.clamp(0, 255) as u32;
                Ok(())
            }
            Variable::NoStop => {
                self.no_stop = value == 1;
                Ok(())
            }
            Variable::Servo => {
                self.write_servo(PwmChannel::Servo, value);
                Ok(())
            }
            Variable::ServoPan => {
                self.write_servo(PwmChannel::ServoPan, value);
                Ok(())
            }
            Variable::ServoAux => {
                self.write_servo(PwmChannel::ServoAux, value);
                Ok(())
            }
            Variable::Car => {
                self.car(value).await;
                Ok(())
            }
        }
    }

    fn write_servo(&mut self, channel: PwmChannel, value: i64) {
        let clamped = value.clamp(SERVO_MIN, SERVO_MAX) as u32;
        self.pwm.write_duty(channel, clamped * 10);
    }

    async fn car(&mut self, value: i64) {
        let Some(action) = CarAction::from_value(value) else {
            debug!("car value {value} outside 1..=5, ignored");
            return;
        };
        debug!("car: {action:?} (speed {}, from {:?})", self.speed, self.drive);

        let speed = self.speed;
        match action {
            CarAction::Forward => {
                self.drive = DriveDirection::Forward;
                self.pwm.write_duty(PwmChannel::RightFwd, speed);
                self.pwm.write_duty(PwmChannel::RightRev, 0);
                self.pwm.write_duty(PwmChannel::LeftFwd, speed);
                self.pwm.write_duty(PwmChannel::LeftRev, 0);
                self.settle_for(self.settle.drive).await;
            }
            CarAction::TurnLeft => {
                self.pwm.write_duty(PwmChannel::RightRev, 0);
                self.pwm.write_duty(PwmChannel::LeftFwd, 0);
                match self.drive {
                    DriveDirection::Forward => {
                        self.pwm.write_duty(PwmChannel::RightFwd, speed);
                        self.pwm.write_duty(PwmChannel::LeftRev, 0);
                    }
                    DriveDirection::Reverse => {
                        self.pwm.write_duty(PwmChannel::RightFwd, 0);
                        self.pwm.write_duty(PwmChannel::LeftRev, speed);
                    }
                    DriveDirection::Stopped => {
                        self.pwm.write_duty(PwmChannel::RightFwd, speed);
                        self.pwm.write_duty(PwmChannel::LeftRev, speed);
                    }
                }
                self.settle_for(self.settle.turn).await;
            }
            CarAction::Stop => {
                self.drive = DriveDirection::Stopped;
                self.pwm.write_duty(PwmChannel::RightFwd, 0);
                self.pwm.write_duty(PwmChannel::RightRev, 0);
                self.pwm.write_duty(PwmChannel::LeftFwd, 0);
                self.pwm.write_duty(PwmChannel::LeftRev, 0);
            }
            CarAction::TurnRight => {
                self.pwm.write_duty(PwmChannel::RightFwd, 0);
                self.pwm.write_duty(PwmChannel::LeftRev, 0);
                match self.drive {
                    DriveDirection::Forward => {
                        self.pwm.write_duty(PwmChannel::RightRev, 0);
                        self.pwm.write_duty(PwmChannel::LeftFwd, speed);
                    }
                    DriveDirection::Reverse => {
                        self.pwm.write_duty(PwmChannel::RightRev, speed);
                        self.pwm.write_duty(PwmChannel::LeftFwd, 0);
                    }
                    DriveDirection::Stopped => {
                        self.pwm.write_duty(PwmChannel::RightRev, speed);
                        self.pwm.write_duty(PwmChannel::LeftFwd, speed);
                    }
                }
                self.settle_for(self.settle.turn).await;
            }
            CarAction::Backward => {
                self.drive = DriveDirection::Reverse;
                self.pwm.write_duty(PwmChannel::RightFwd, 0);
                self.pwm.write_duty(PwmChannel::RightRev, speed);
                self.pwm.write_duty(PwmChannel::LeftFwd, 0);
                self.pwm.write_duty(PwmChannel::LeftRev, speed);
                self.settle_for(self.settle.drive).await;
            }
        }

        // default behavior is a pulsed, self-stopping motion; no-stop keeps
        // the commanded direction active until an explicit Stop
        if !self.no_stop {
            for channel in PwmChannel::MOTORS {
                self.pwm.write_duty(channel, 0);
            }
        }
    }

    async fn settle_for(&self, delay: Duration) {
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }
}

pub(crate) fn lock_sensor(
    sensor: &Mutex<dyn SensorControl>,
) -> MutexGuard<'_, dyn SensorControl + 'static> {
    sensor.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::StaticSensor;
    use crate::test_utils::MockPwm;

    fn actuator() -> (Actuator, MockPwm) {
        let (pwm, handle) = MockPwm::new();
        let actuator = Actuator::new(Box::new(pwm)).with_settle_delays(SettleDelays::none());
        (actuator, handle)
    }

    fn jpeg_sensor() -> Mutex<StaticSensor> {
        Mutex::new(StaticSensor::default())
    }

    #[tokio::test]
    async fn speed_is_clamped_into_duty_range() {
        let (mut actuator, _pwm) = actuator();
        let sensor = jpeg_sensor();

        actuator.apply(Variable::Speed, -5, &sensor).await.unwrap();
        assert_eq!(actuator.speed(), 0);

        actuator.apply(Variable::Speed, 300, &sensor).await.unwrap();
        assert_eq!(actuator.speed(), 255);
    }

    #[tokio::test]
    async fn servo_values_clamp_then_scale() {
        let (mut actuator, pwm) = actuator();
        let sensor = jpeg_sensor();

        actuator.apply(Variable::Servo, 100, &sensor).await.unwrap();
        actuator.apply(Variable::Servo, 900, &sensor).await.unwrap();
        actuator.apply(Variable::ServoPan, 487, &sensor).await.unwrap();

        let writes = pwm.writes();
        assert_eq!(writes[0], (PwmChannel::Servo, 3250));
        assert_eq!(writes[1], (PwmChannel::Servo, 6500));
        assert_eq!(writes[2], (PwmChannel::ServoPan, 4870));
    }

    #[tokio::test]
    async fn flash_duty_is_clamped() {
        let (mut actuator, pwm) = actuator();
        let sensor = jpeg_sensor();

        actuator.apply(Variable::Flash, 300, &sensor).await.unwrap();
        actuator.apply(Variable::Flash, -9, &sensor).await.unwrap();

        assert_eq!(pwm.writes(), vec![(PwmChannel::Flash, 255), (PwmChannel::Flash, 0)]);
    }

    #[tokio::test]
    async fn nostop_persists_only_for_exactly_one() {
        let (mut actuator, _pwm) = actuator();
        let sensor = jpeg_sensor();

        actuator.apply(Variable::NoStop, 1, &sensor).await.unwrap();
        assert!(actuator.no_stop());

        actuator.apply(Variable::NoStop, 0, &sensor).await.unwrap();
        assert!(!actuator.no_stop());

        actuator.apply(Variable::NoStop, 5, &sensor).await.unwrap();
        assert!(!actuator.no_stop());
    }

    #[tokio::test]
    async fn forward_drives_both_sides_then_pulses_off() {
        let (mut actuator, pwm) = actuator();
        let sensor = jpeg_sensor();

        actuator.apply(Variable::Car, 1, &sensor).await.unwrap();

        assert_eq!(actuator.drive_direction(), DriveDirection::Forward);
        let writes = pwm.writes();
        // directional pulse first
        assert_eq!(writes[0], (PwmChannel::RightFwd, 255));
        assert_eq!(writes[2], (PwmChannel::LeftFwd, 255));
        // then the self-stop zeroes every motor channel
        let duties = pwm.final_duties();
        for channel in PwmChannel::MOTORS {
            assert_eq!(duties.get(&channel), Some(&0), "{channel:?} must end at 0");
        }
    }

    #[tokio::test]
    async fn nostop_keeps_the_commanded_direction_active() {
        let (mut actuator, pwm) = actuator();
        let sensor = jpeg_sensor();

        actuator.apply(Variable::NoStop, 1, &sensor).await.unwrap();
        actuator.apply(Variable::Car, 1, &sensor).await.unwrap();

        let duties = pwm.final_duties();
        assert_eq!(duties.get(&PwmChannel::RightFwd), Some(&255));
        assert_eq!(duties.get(&PwmChannel::LeftFwd), Some(&255));
        assert_eq!(duties.get(&PwmChannel::RightRev), Some(&0));
        assert_eq!(duties.get(&PwmChannel::LeftRev), Some(&0));
    }

    #[tokio::test]
    async fn turning_from_standstill_pivots_symmetrically() {
        let (mut actuator, pwm) = actuator();
        let sensor = jpeg_sensor();
        actuator.apply(Variable::NoStop, 1, &sensor).await.unwrap();
        actuator.apply(Variable::Speed, 200, &sensor).await.unwrap();

        actuator.apply(Variable::Car, 2, &sensor).await.unwrap();

        let duties = pwm.final_duties();
        assert_eq!(duties.get(&PwmChannel::RightFwd), Some(&200));
        assert_eq!(duties.get(&PwmChannel::LeftRev), Some(&200));
        assert_eq!(duties.get(&PwmChannel::RightRev), Some(&0));
        assert_eq!(duties.get(&PwmChannel::LeftFwd), Some(&0));
    }

    #[tokio::test]
    async fn turning_while_forward_pivots_asymmetrically() {
        let (mut actuator, pwm) = actuator();
        let sensor = jpeg_sensor();
        actuator.apply(Variable::NoStop, 1, &sensor).await.unwrap();
        actuator.apply(Variable::Speed, 200, &sensor).await.unwrap();

        actuator.apply(Variable::Car, 1, &sensor).await.unwrap();
        actuator.apply(Variable::Car, 2, &sensor).await.unwrap();

        // only the right side keeps driving; nothing runs in reverse
        let duties = pwm.final_duties();
        assert_eq!(duties.get(&PwmChannel::RightFwd), Some(&200));
        assert_eq!(duties.get(&PwmChannel::LeftRev), Some(&0));
        assert_eq!(duties.get(&PwmChannel::RightRev), Some(&0));
        assert_eq!(duties.get(&PwmChannel::LeftFwd), Some(&0));
        // a turn does not change the remembered direction
        assert_eq!(actuator.drive_direction(), DriveDirection::Forward);
    }

    #[tokio::test]
    async fn turning_while_reversing_avoids_polarity_flips() {
        let (mut actuator, pwm) = actuator();
        let sensor = jpeg_sensor();
        actuator.apply(Variable::NoStop, 1, &sensor).await.unwrap();

        actuator.apply(Variable::Car, 5, &sensor).await.unwrap();
        actuator.apply(Variable::Car, 2, &sensor).await.unwrap();

        let duties = pwm.final_duties();
        assert_eq!(duties.get(&PwmChannel::RightFwd), Some(&0));
        assert_eq!(duties.get(&PwmChannel::LeftRev), Some(&255));
        assert_eq!(actuator.drive_direction(), DriveDirection::Reverse);
    }

    #[tokio::test]
    async fn turn_right_mirrors_turn_left() {
        let (mut actuator, pwm) = actuator();
        let sensor = jpeg_sensor();
        actuator.apply(Variable::NoStop, 1, &sensor).await.unwrap();

        actuator.apply(Variable::Car, 1, &sensor).await.unwrap();
        actuator.apply(Variable::Car, 4, &sensor).await.unwrap();

        let duties = pwm.final_duties();
        assert_eq!(duties.get(&PwmChannel::LeftFwd), Some(&255));
        assert_eq!(duties.get(&PwmChannel::RightFwd), Some(&0));
        assert_eq!(duties.get(&PwmChannel::RightRev), Some(&0));
        assert_eq!(duties.get(&PwmChannel::LeftRev), Some(&0));
    }

    #[tokio::test]
    async fn stop_zeroes_everything_and_resets_direction() {
        let (mut actuator, pwm) = actuator();
        let sensor = jpeg_sensor();
        actuator.apply(Variable::NoStop, 1, &sensor).await.unwrap();

        actuator.apply(Variable::Car, 1, &sensor).await.unwrap();
        actuator.apply(Variable::Car, 3, &sensor).await.unwrap();

        assert_eq!(actuator.drive_direction(), DriveDirection::Stopped);
        let duties = pwm.final_duties();
        for channel in PwmChannel::MOTORS {
            assert_eq!(duties.get(&channel), Some(&0));
        }
    }

    #[tokio::test]
    async fn out_of_range_car_value_takes_no_action() {
        let (mut actuator, pwm) = actuator();
        let sensor = jpeg_sensor();

        actuator.apply(Variable::Car, 9, &sensor).await.unwrap();
        actuator.apply(Variable::Car, 0, &sensor).await.unwrap();

        assert!(pwm.writes().is_empty());
        assert_eq!(actuator.drive_direction(), DriveDirection::Stopped);
    }

    #[tokio::test]
    async fn framesize_applies_only_when_sensor_outputs_jpeg() {
        let (mut actuator, _pwm) = actuator();

        let jpeg = jpeg_sensor();
        actuator.apply(Variable::FrameSize, 6, &jpeg).await.unwrap();
        assert_eq!(lock_sensor(&jpeg).frame_size(), FrameSize::Vga);

        let raw = Mutex::new(StaticSensor::new(PixelFormat::Gray8, FrameSize::Cif, 10));
        actuator.apply(Variable::FrameSize, 6, &raw).await.unwrap();
        assert_eq!(lock_sensor(&raw).frame_size(), FrameSize::Cif);
    }

    #[tokio::test]
    async fn invalid_framesize_index_is_a_sensor_error() {
        let (mut actuator, _pwm) = actuator();
        let sensor = jpeg_sensor();

        let err = actuator.apply(Variable::FrameSize, 42, &sensor).await.unwrap_err();
        assert!(matches!(err, RoverError::Sensor { .. }));
    }

    #[tokio::test]
    async fn quality_is_forwarded_to_the_sensor() {
        let (mut actuator, _pwm) = actuator();
        let sensor = jpeg_sensor();

        actuator.apply(Variable::Quality, 30, &sensor).await.unwrap();
        assert_eq!(lock_sensor(&sensor).quality(), 30);

        assert!(actuator.apply(Variable::Quality, 99, &sensor).await.is_err());
    }

    #[test]
    fn variable_names_match_the_wire_protocol() {
        assert_eq!("framesize".parse::<Variable>().unwrap(), Variable::FrameSize);
        assert_eq!("servo3".parse::<Variable>().unwrap(), Variable::ServoAux);
        assert_eq!("car".parse::<Variable>().unwrap(), Variable::Car);
        assert!(matches!(
            "bogus".parse::<Variable>(),
            Err(RoverError::UnknownVariable { .. })
        ));
    }

    #[test]
    fn channel_numbers_match_the_board_wiring() {
        assert_eq!(PwmChannel::RightRev.id(), 3);
        assert_eq!(PwmChannel::RightFwd.id(), 4);
        assert_eq!(PwmChannel::LeftFwd.id(), 5);
        assert_eq!(PwmChannel::LeftRev.id(), 6);
        assert_eq!(PwmChannel::Flash.id(), 7);
        assert_eq!(PwmChannel::Servo.id(), 8);
        assert_eq!(PwmChannel::ServoPan.id(), 9);
        assert_eq!(PwmChannel::ServoAux.id(), 10);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn speed_always_lands_in_duty_range(value in any::<i64>()) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .unwrap();
                rt.block_on(async {
                    let (mut actuator, _pwm) = actuator();
                    let sensor = jpeg_sensor();
                    actuator.apply(Variable::Speed, value, &sensor).await.unwrap();
                    prop_assert!(actuator.speed() <= 255);
                    Ok(())
                })?;
            }

            #[test]
            fn servo_duty_stays_in_hardware_range(value in any::<i64>()) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .unwrap();
                rt.block_on(async {
                    let (mut actuator, pwm) = actuator();
                    let sensor = jpeg_sensor();
                    actuator.apply(Variable::Servo, value, &sensor).await.unwrap();
                    let (channel, duty) = pwm.writes()[0];
                    prop_assert_eq!(channel, PwmChannel::Servo);
                    prop_assert!((3250..=6500).contains(&duty));
                    Ok(())
                })?;
            }
        }
    }
}
