/// Analog input span selected per channel.
///
/// The discriminant is the range code the device expects in the high byte of
/// an `slist` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputRange {
    /// ±10 V
    #[default]
    Bipolar10V = 0,
    /// ±5 V
    Bipolar5V = 1,
    /// ±2.5 V
    Bipolar2V5 = 2,
    /// 0-10 V
    Unipolar10V = 3,
    /// 0-5 V
    Unipolar5V = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid range code {0}, valid range codes are 0-4")]
pub struct InvalidRange(pub u8);

/// How a decoded count is shifted after scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetPolicy {
    None,
    HalfMultiplier,
}

/// Bit-to-volt conversion for one range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeScale {
    pub multiplier: f64,
    pub divisor: f64,
    pub offset_policy: OffsetPolicy,
}

impl RangeScale {
    pub fn offset(&self) -> f64 {
        match self.offset_policy {
            OffsetPolicy::None => 0.0,
            OffsetPolicy::HalfMultiplier => self.multiplier / 2.0,
        }
    }

    /// Convert a signed ADC count to volts.
    pub fn to_voltage(&self, raw: i16) -> f64 {
        (self.multiplier * f64::from(raw)).mul_add(self.divisor, self.offset())
    }
}

impl InputRange {
    pub const ALL: [Self; 5] = [
        Self::Bipolar10V,
        Self::Bipolar5V,
        Self::Bipolar2V5,
        Self::Unipolar10V,
        Self::Unipolar5V,
    ];

    pub fn from_code(code: u8) -> Result<Self, InvalidRange> {
        match code {
            0 => Ok(Self::Bipolar10V),
            1 => Ok(Self::Bipolar5V),
            2 => Ok(Self::Bipolar2V5),
            3 => Ok(Self::Unipolar10V),
            4 => Ok(Self::Unipolar5V),
            _ => Err(InvalidRange(code)),
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bipolar10V => "±10 V",
            Self::Bipolar5V => "±5 V",
            Self::Bipolar2V5 => "±2.5 V",
            Self::Unipolar10V => "0-10 V",
            Self::Unipolar5V => "0-5 V",
        }
    }

    pub fn scale(self) -> RangeScale {
        const BIPOLAR_DIVISOR: f64 = 1.0 / 32_768.0;
        const UNIPOLAR_DIVISOR: f64 = 1.0 / 65_536.0;

        let (multiplier, divisor, offset_policy) = match self {
            Self::Bipolar10V => (10.0, BIPOLAR_DIVISOR, OffsetPolicy::None),
            Self::Bipolar5V => (5.0, BIPOLAR_DIVISOR, OffsetPolicy::None),
            Self::Bipolar2V5 => (2.5, BIPOLAR_DIVISOR, OffsetPolicy::None),
            Self::Unipolar10V => (10.0, UNIPOLAR_DIVISOR, OffsetPolicy::HalfMultiplier),
            Self::Unipolar5V => (5.0, UNIPOLAR_DIVISOR, OffsetPolicy::HalfMultiplier),
        };

        RangeScale {
            multiplier,
            divisor,
            offset_policy,
        }
    }
}

impl TryFrom<u8> for InputRange {
    type Error = InvalidRange;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code)
    }
}

/// Look up the scale factors for a raw range code.
pub fn resolve(code: u8) -> Result<RangeScale, InvalidRange> {
    InputRange::from_code(code).map(InputRange::scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_table() {
        let expected = [
            (10.0, 1.0 / 32768.0, OffsetPolicy::None),
            (5.0, 1.0 / 32768.0, OffsetPolicy::None),
            (2.5, 1.0 / 32768.0, OffsetPolicy::None),
            (10.0, 1.0 / 65536.0, OffsetPolicy::HalfMultiplier),
            (5.0, 1.0 / 65536.0, OffsetPolicy::HalfMultiplier),
        ];

        for (code, (multiplier, divisor, offset_policy)) in expected.into_iter().enumerate() {
            let scale = resolve(code as u8).unwrap();
            assert_eq!(scale.multiplier, multiplier);
            assert_eq!(scale.divisor, divisor);
            assert_eq!(scale.offset_policy, offset_policy);
        }
    }

    #[test]
    fn test_resolve_rejects_unknown_codes() {
        for code in 5..=u8::MAX {
            assert_eq!(resolve(code), Err(InvalidRange(code)));
        }
    }

    #[test]
    fn test_offset() {
        assert_eq!(InputRange::Bipolar5V.scale().offset(), 0.0);
        assert_eq!(InputRange::Unipolar10V.scale().offset(), 5.0);
        assert_eq!(InputRange::Unipolar5V.scale().offset(), 2.5);
    }

    #[test]
    fn test_code_round_trip() {
        for range in InputRange::ALL {
            assert_eq!(InputRange::try_from(range.code()), Ok(range));
        }
    }

    #[test]
    fn test_full_scale_voltages() {
        let bipolar = InputRange::Bipolar10V.scale();
        assert_eq!(bipolar.to_voltage(i16::MIN), -10.0);
        assert_eq!(bipolar.to_voltage(0), 0.0);

        let unipolar = InputRange::Unipolar10V.scale();
        assert_eq!(unipolar.to_voltage(i16::MIN), 0.0);
        assert_eq!(unipolar.to_voltage(0), 5.0);
    }
}
