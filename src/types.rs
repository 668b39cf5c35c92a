use fixed::types::I32F32;

/// Page-space points as binary fixed-point. All layout arithmetic stays in
/// this type so identical inputs produce bit-identical coordinates on every
/// platform, which is what makes whole-document output byte-stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pt(I32F32);

impl Pt {
    pub const ZERO: Pt = Pt(I32F32::from_bits(0));

    pub fn from_f32(value: f32) -> Pt {
        if !value.is_finite() {
            return Pt::ZERO;
        }
        // Clamp inside the i32 integer range so from_num cannot overflow.
        let value = (value as f64).clamp(-2_000_000_000.0, 2_000_000_000.0);
        Pt(I32F32::from_num(value))
    }

    pub fn from_i32(value: i32) -> Pt {
        Pt(I32F32::from_num(value))
    }

    pub fn to_f32(self) -> f32 {
        self.0.to_num()
    }

    /// Thousandths of a point, rounded. Stable key for caches and hashes.
    pub fn to_milli_i64(self) -> i64 {
        let bits = self.0.to_bits() as i128;
        let denom = 1i128 << 32;
        let adj = if bits >= 0 { denom / 2 } else { -(denom / 2) };
        ((bits * 1000 + adj) / denom) as i64
    }

    pub fn min(self, other: Pt) -> Pt {
        if self <= other { self } else { other }
    }

    pub fn max(self, other: Pt) -> Pt {
        if self >= other { self } else { other }
    }

    /// Multiplies by the rational `num/denom` with round-half-away rounding.
    /// Used to scale 1000-unit font metrics by a font size.
    pub fn mul_ratio(self, num: i32, denom: i32) -> Pt {
        if denom == 0 {
            return Pt::ZERO;
        }
        let wide = (self.0.to_bits() as i128) * num as i128;
        let denom = denom as i128;
        let adj = if (wide >= 0) == (denom > 0) {
            denom.abs() / 2
        } else {
            -(denom.abs() / 2)
        };
        let bits = ((wide + adj) / denom).clamp(i64::MIN as i128, i64::MAX as i128);
        Pt(I32F32::from_bits(bits as i64))
    }
}

impl std::ops::Add for Pt {
    type Output = Pt;
    fn add(self, rhs: Pt) -> Pt {
        Pt(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::AddAssign for Pt {
    fn add_assign(&mut self, rhs: Pt) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub for Pt {
    type Output = Pt;
    fn sub(self, rhs: Pt) -> Pt {
        Pt(self.0.saturating_sub(rhs.0))
    }
}

impl std::ops::SubAssign for Pt {
    fn sub_assign(&mut self, rhs: Pt) {
        *self = *self - rhs;
    }
}

impl std::ops::Neg for Pt {
    type Output = Pt;
    fn neg(self) -> Pt {
        Pt(I32F32::from_bits(0).saturating_sub(self.0))
    }
}

impl std::ops::Mul<i32> for Pt {
    type Output = Pt;
    fn mul(self, rhs: i32) -> Pt {
        self.mul_ratio(rhs, 1)
    }
}

impl std::ops::Div<i32> for Pt {
    type Output = Pt;
    fn div(self, rhs: i32) -> Pt {
        self.mul_ratio(1, rhs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn gray(level: f32) -> Self {
        Self {
            r: level,
            g: level,
            b: level,
        }
    }
}
