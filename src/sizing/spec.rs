use std::fmt;

/// How a parent constrains one axis of a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasureMode {
    Exact,
    AtMost,
    Unspecified,
}

/// One axis of a measurement request: a mode plus a size in pixels.
/// The size is ignored for [`MeasureMode::Unspecified`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeasureSpec {
    pub mode: MeasureMode,
    pub size: i32,
}

impl MeasureSpec {
    pub const fn exact(size: i32) -> Self {
        Self {
            mode: MeasureMode::Exact,
            size,
        }
    }

    pub const fn at_most(size: i32) -> Self {
        Self {
            mode: MeasureMode::AtMost,
            size,
        }
    }

    pub const fn unspecified() -> Self {
        Self {
            mode: MeasureMode::Unspecified,
            size: 0,
        }
    }

    pub fn is_exact(&self) -> bool {
        self.mode == MeasureMode::Exact
    }

    /// Upper bound imposed by this request, if any.
    pub fn limit(&self) -> Option<i32> {
        match self.mode {
            MeasureMode::Exact | MeasureMode::AtMost => Some(self.size),
            MeasureMode::Unspecified => None,
        }
    }

    /// Shrink the request by `amount` (padding), never below zero.
    pub fn shrink(self, amount: i32) -> Self {
        match self.mode {
            MeasureMode::Unspecified => self,
            _ => Self {
                size: (self.size - amount).max(0),
                ..self
            },
        }
    }

    /// Final size for content whose natural extent is `natural`.
    pub fn resolve(&self, natural: i32) -> i32 {
        match self.mode {
            MeasureMode::Exact => self.size,
            MeasureMode::AtMost => natural.min(self.size),
            MeasureMode::Unspecified => natural,
        }
    }
}

impl Default for MeasureSpec {
    fn default() -> Self {
        Self::unspecified()
    }
}

impl fmt::Display for MeasureSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            MeasureMode::Exact => write!(f, "exact({})", self.size),
            MeasureMode::AtMost => write!(f, "at_most({})", self.size),
            MeasureMode::Unspecified => f.write_str("unspecified"),
        }
    }
}
