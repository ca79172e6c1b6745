//! Grid format tokens: named presets (`384`) or explicit `ROWSxCOLS`.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Rows × columns of the culture array on a plate.
///
/// Fields are public so library callers can describe any array; the
/// calibrator rejects a grid without cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridFormat {
    pub nrow: usize,
    pub ncol: usize,
}

impl GridFormat {
    pub const fn new(nrow: usize, ncol: usize) -> Self {
        Self { nrow, ncol }
    }

    /// Standard plate layouts by culture count.
    ///
    /// 768 cultures are pinned as every other spot of a 1536 array, so the
    /// grid searched is the full 32x48 lattice.
    pub fn from_preset(cultures: usize) -> Option<Self> {
        match cultures {
            96 => Some(Self::new(8, 12)),
            384 => Some(Self::new(16, 24)),
            768 | 1536 => Some(Self::new(32, 48)),
            _ => None,
        }
    }

    /// Parse the format as it is given on a command line: one token (preset or
    /// `RxC`) or two tokens (rows, columns).
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Result<Self, ConfigError> {
        let format = match tokens {
            [] => return Err(ConfigError::MissingFormat),
            [single] => single.as_ref().parse()?,
            [rows, cols] => Self::new(parse_count(rows.as_ref())?, parse_count(cols.as_ref())?),
            _ => {
                return Err(ConfigError::TooManyDimensions {
                    tokens: tokens.iter().map(|t| t.as_ref().to_string()).collect(),
                });
            }
        };

        if format.cell_count() == 0 {
            return Err(ConfigError::EmptyGrid {
                nrow: format.nrow,
                ncol: format.ncol,
            });
        }
        Ok(format)
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.nrow * self.ncol
    }
}

impl FromStr for GridFormat {
    type Err = ConfigError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        if let Some((rows, cols)) = token.split_once(['x', 'X']) {
            return Ok(Self::new(parse_count(rows)?, parse_count(cols)?));
        }

        parse_count(token)
            .ok()
            .and_then(Self::from_preset)
            .ok_or_else(|| ConfigError::UnknownFormat {
                token: token.to_string(),
            })
    }
}

impl fmt::Display for GridFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.nrow, self.ncol)
    }
}

fn parse_count(token: &str) -> Result<usize, ConfigError> {
    token
        .trim()
        .parse()
        .map_err(|_| ConfigError::UnknownFormat {
            token: token.to_string(),
        })
}
