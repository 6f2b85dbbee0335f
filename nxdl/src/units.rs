//! Unit categories (`NX_LENGTH`, `NX_ENERGY`, ...) and the dimensional analysis deciding
//! whether a concrete unit expression such as `kg*m/s**2` belongs to one of them.

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;
use thiserror::Error;

/// Exponents of the base quantities, in the order of [`BASE_QUANTITIES`].
pub type Dimensionality = [i8; 8];

pub const BASE_QUANTITIES: [&str; 8] = [
    "length",
    "mass",
    "time",
    "current",
    "temperature",
    "amount",
    "luminosity",
    "angle",
];

const L: usize = 0;
const M: usize = 1;
const T: usize = 2;
const I: usize = 3;
const THETA: usize = 4;
const N: usize = 5;
const J: usize = 6;
const A: usize = 7;

const fn dim<const K: usize>(pairs: [(usize, i8); K]) -> Dimensionality {
    let mut d = [0; 8];
    let mut k = 0;
    while k < K {
        d[pairs[k].0] = pairs[k].1;
        k += 1;
    }
    d
}

const NONE: Dimensionality = [0; 8];
const LENGTH: Dimensionality = dim([(L, 1)]);
const MASS: Dimensionality = dim([(M, 1)]);
const TIME: Dimensionality = dim([(T, 1)]);
const CURRENT: Dimensionality = dim([(I, 1)]);
const TEMPERATURE: Dimensionality = dim([(THETA, 1)]);
const AMOUNT: Dimensionality = dim([(N, 1)]);
const LUMINOSITY: Dimensionality = dim([(J, 1)]);
const ANGLE: Dimensionality = dim([(A, 1)]);
const SOLID_ANGLE: Dimensionality = dim([(A, 2)]);
const AREA: Dimensionality = dim([(L, 2)]);
const VOLUME: Dimensionality = dim([(L, 3)]);
const FREQUENCY: Dimensionality = dim([(T, -1)]);
const FORCE: Dimensionality = dim([(M, 1), (L, 1), (T, -2)]);
const PRESSURE: Dimensionality = dim([(M, 1), (L, -1), (T, -2)]);
const ENERGY: Dimensionality = dim([(M, 1), (L, 2), (T, -2)]);
const POWER: Dimensionality = dim([(M, 1), (L, 2), (T, -3)]);
const CHARGE: Dimensionality = dim([(I, 1), (T, 1)]);
const VOLTAGE: Dimensionality = dim([(M, 1), (L, 2), (T, -3), (I, -1)]);
const CAPACITANCE: Dimensionality = dim([(M, -1), (L, -2), (T, 4), (I, 2)]);
const RESISTANCE: Dimensionality = dim([(M, 1), (L, 2), (T, -3), (I, -2)]);
const CONDUCTANCE: Dimensionality = dim([(M, -1), (L, -2), (T, 3), (I, 2)]);
const MAGNETIC_FLUX: Dimensionality = dim([(M, 1), (L, 2), (T, -2), (I, -1)]);
const MAGNETIC_FIELD: Dimensionality = dim([(M, 1), (T, -2), (I, -1)]);
const INDUCTANCE: Dimensionality = dim([(M, 1), (L, 2), (T, -2), (I, -2)]);
const DOSE: Dimensionality = dim([(L, 2), (T, -2)]);

/// Why a unit expression could not be parsed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum UnitError {
    #[error("unknown unit {0:?}")]
    UnknownUnit(String),
    #[error("malformed unit expression {expression:?}: {reason}")]
    Syntax {
        expression: String,
        reason: &'static str,
    },
    #[error("exponents in {0:?} are out of range")]
    ExponentOutOfRange(String),
}

/// Table of known unit symbols and their dimensionality.
#[derive(Clone, Debug)]
pub struct UnitRegistry {
    units: HashMap<String, Dimensionality>,
    /// Symbols that accept an SI prefix (`km`, `meV`, `mbar`).
    prefixable: HashMap<String, Dimensionality>,
}

const SI_PREFIXES: [&str; 21] = [
    "da", "Y", "Z", "E", "P", "T", "G", "M", "k", "h", "d", "c", "m", "u", "µ", "μ", "n", "p", "f",
    "a", "z",
];

impl Default for UnitRegistry {
    fn default() -> Self {
        let mut registry = Self {
            units: HashMap::new(),
            prefixable: HashMap::new(),
        };

        for (symbol, d) in [
            ("m", LENGTH),
            ("g", MASS),
            ("s", TIME),
            ("A", CURRENT),
            ("K", TEMPERATURE),
            ("mol", AMOUNT),
            ("cd", LUMINOSITY),
            ("rad", ANGLE),
            ("sr", SOLID_ANGLE),
            ("Hz", FREQUENCY),
            ("N", FORCE),
            ("Pa", PRESSURE),
            ("bar", PRESSURE),
            ("Torr", PRESSURE),
            ("J", ENERGY),
            ("eV", ENERGY),
            ("W", POWER),
            ("C", CHARGE),
            ("V", VOLTAGE),
            ("F", CAPACITANCE),
            ("Ohm", RESISTANCE),
            ("ohm", RESISTANCE),
            ("Ω", RESISTANCE),
            ("S", CONDUCTANCE),
            ("Wb", MAGNETIC_FLUX),
            ("T", MAGNETIC_FIELD),
            ("H", INDUCTANCE),
            ("Gy", DOSE),
            ("Sv", DOSE),
            ("Bq", FREQUENCY),
            ("L", VOLUME),
            ("l", VOLUME),
            ("barn", AREA),
        ] {
            registry.define_prefixable(symbol, d);
        }

        for (symbol, d) in [
            ("meter", LENGTH),
            ("metre", LENGTH),
            ("micron", LENGTH),
            ("Å", LENGTH),
            ("Angstrom", LENGTH),
            ("angstrom", LENGTH),
            ("inch", LENGTH),
            ("gram", MASS),
            ("kilogram", MASS),
            ("amu", MASS),
            ("Da", MASS),
            ("second", TIME),
            ("min", TIME),
            ("minute", TIME),
            ("h", TIME),
            ("hour", TIME),
            ("d", TIME),
            ("day", TIME),
            ("ampere", CURRENT),
            ("kelvin", TEMPERATURE),
            ("degC", TEMPERATURE),
            ("celsius", TEMPERATURE),
            ("°C", TEMPERATURE),
            ("degF", TEMPERATURE),
            ("fahrenheit", TEMPERATURE),
            ("mole", AMOUNT),
            ("deg", ANGLE),
            ("degree", ANGLE),
            ("degrees", ANGLE),
            ("°", ANGLE),
            ("radian", ANGLE),
            ("arcmin", ANGLE),
            ("arcsec", ANGLE),
            ("steradian", SOLID_ANGLE),
            ("hertz", FREQUENCY),
            ("rpm", FREQUENCY),
            ("newton", FORCE),
            ("pascal", PRESSURE),
            ("atm", PRESSURE),
            ("psi", PRESSURE),
            ("joule", ENERGY),
            ("cal", ENERGY),
            ("Ry", ENERGY),
            ("Hartree", ENERGY),
            ("watt", POWER),
            ("coulomb", CHARGE),
            ("volt", VOLTAGE),
            ("tesla", MAGNETIC_FIELD),
            ("gauss", MAGNETIC_FIELD),
            ("G", MAGNETIC_FIELD),
            ("Oe", MAGNETIC_FIELD),
            ("count", NONE),
            ("counts", NONE),
            ("cps", FREQUENCY),
            ("pixel", NONE),
            ("pixels", NONE),
            ("percent", NONE),
            ("%", NONE),
            ("ppm", NONE),
        ] {
            registry.define(symbol, d);
        }

        registry
    }
}

impl UnitRegistry {
    pub fn define(&mut self, symbol: &str, dimensionality: Dimensionality) {
        self.units.insert(symbol.to_string(), dimensionality);
    }

    pub fn define_prefixable(&mut self, symbol: &str, dimensionality: Dimensionality) {
        self.define(symbol, dimensionality);
        self.prefixable.insert(symbol.to_string(), dimensionality);
    }

    /// The shared registry of built-in units.
    pub fn global() -> &'static UnitRegistry {
        &REGISTRY
    }

    fn lookup(&self, symbol: &str) -> Option<Dimensionality> {
        if let Some(d) = self.units.get(symbol) {
            return Some(*d);
        }
        SI_PREFIXES.iter().find_map(|prefix| {
            symbol
                .strip_prefix(prefix)
                .filter(|rest| !rest.is_empty())
                .and_then(|rest| self.prefixable.get(rest))
                .copied()
        })
    }

    /// Parses a unit expression into its dimensionality. The empty expression is
    /// dimensionless.
    pub fn dimensionality(&self, expression: &str) -> Result<Dimensionality, UnitError> {
        let tokens = tokenize(expression)?;
        if tokens.is_empty() {
            return Ok(NONE);
        }
        let mut parser = Parser {
            registry: self,
            expression,
            tokens: &tokens,
            at: 0,
        };
        let d = parser.product()?;
        if parser.at != tokens.len() {
            return Err(parser.syntax("unexpected trailing input"));
        }
        Ok(d)
    }

    /// Decides whether `unit` is acceptable for `category`. `transformation_type` is the
    /// value of a sibling `transformation_type` attribute, consulted only for
    /// [`UnitCategory::Transformation`].
    pub fn check(
        &self,
        category: UnitCategory,
        unit: &str,
        transformation_type: Option<&str>,
    ) -> UnitCheck {
        let unit = unit.trim();
        let category = match category {
            UnitCategory::Any => {
                return match self.dimensionality(unit) {
                    Ok(_) => UnitCheck::Valid,
                    Err(UnitError::ExponentOutOfRange(_)) => UnitCheck::Invalid,
                    Err(_) => UnitCheck::Unparseable,
                }
            }
            UnitCategory::Transformation => match transformation_type {
                Some("translation") => UnitCategory::Length,
                Some("rotation") => UnitCategory::Angle,
                None => UnitCategory::Unitless,
                Some(_) => return UnitCheck::InvalidTransformationType,
            },
            other => other,
        };

        if matches!(category, UnitCategory::Unitless | UnitCategory::Dimensionless) {
            return if unit.is_empty() {
                UnitCheck::Valid
            } else {
                UnitCheck::Invalid
            };
        }

        match (self.dimensionality(unit), category.dimensionality()) {
            // parsed, but no physical quantity has such a dimensionality
            (Err(UnitError::ExponentOutOfRange(_)), _) => UnitCheck::Invalid,
            (Err(_), _) => UnitCheck::Unparseable,
            (Ok(actual), Some(expected)) if actual == expected => UnitCheck::Valid,
            (Ok(_), _) => UnitCheck::Invalid,
        }
    }

    pub fn matches(&self, category: UnitCategory, unit: &str) -> bool {
        self.check(category, unit, None) == UnitCheck::Valid
    }
}

lazy_static! {
    static ref REGISTRY: UnitRegistry = UnitRegistry::default();
}

/// Outcome of [`UnitRegistry::check`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnitCheck {
    Valid,
    /// Parsed, but of the wrong dimensionality.
    Invalid,
    Unparseable,
    InvalidTransformationType,
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Symbol(String),
    Number(f64),
    Times,
    Divide,
    Power,
    Open,
    Close,
}

fn tokenize(expression: &str) -> Result<Vec<Token>, UnitError> {
    let syntax = |reason| UnitError::Syntax {
        expression: expression.to_string(),
        reason,
    };
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '*' => {
                chars.next();
                if chars.peek() == Some(&'*') {
                    chars.next();
                    tokens.push(Token::Power);
                } else {
                    tokens.push(Token::Times);
                }
            }
            '·' | '.' if matches!(tokens.last(), Some(Token::Symbol(_) | Token::Close)) => {
                chars.next();
                tokens.push(Token::Times);
            }
            '^' => {
                chars.next();
                tokens.push(Token::Power);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Divide);
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                let mut literal = String::new();
                literal.push(c);
                chars.next();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number = literal.parse().map_err(|_| syntax("invalid number"))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || matches!(c, '_' | '°' | '%' | 'Å' | 'Ω' | 'µ') => {
                let mut symbol = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_alphabetic() || matches!(d, '_' | '°' | '%' | 'Å' | 'Ω' | 'µ') {
                        symbol.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Symbol(symbol));
            }
            _ => return Err(syntax("unexpected character")),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    registry: &'a UnitRegistry,
    expression: &'a str,
    tokens: &'a [Token],
    at: usize,
}

impl Parser<'_> {
    fn syntax(&self, reason: &'static str) -> UnitError {
        UnitError::Syntax {
            expression: self.expression.to_string(),
            reason,
        }
    }

    fn out_of_range(&self) -> UnitError {
        UnitError::ExponentOutOfRange(self.expression.to_string())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.at)
    }

    /// `product := power (('*' | '/' | <juxtaposition>) power)*`
    fn product(&mut self) -> Result<Dimensionality, UnitError> {
        let mut d = self.power()?;
        loop {
            let sign = match self.peek() {
                Some(Token::Times) => {
                    self.at += 1;
                    1
                }
                Some(Token::Divide) => {
                    self.at += 1;
                    -1
                }
                Some(Token::Symbol(_) | Token::Number(_) | Token::Open) => 1,
                _ => return Ok(d),
            };
            let rhs = self.power()?;
            for (lhs, rhs) in d.iter_mut().zip(rhs) {
                *lhs = rhs
                    .checked_mul(sign)
                    .and_then(|rhs| lhs.checked_add(rhs))
                    .ok_or_else(|| self.out_of_range())?;
            }
        }
    }

    /// `power := atom (('**' | '^') number)?`
    fn power(&mut self) -> Result<Dimensionality, UnitError> {
        let mut d = self.atom()?;
        if self.peek() == Some(&Token::Power) {
            self.at += 1;
            let exponent = match self.peek() {
                Some(Token::Number(n)) if n.fract() == 0.0 => {
                    if n.abs() > f64::from(i8::MAX) {
                        return Err(self.out_of_range());
                    }
                    *n as i8
                }
                _ => return Err(self.syntax("exponent must be an integer")),
            };
            self.at += 1;
            for e in d.iter_mut() {
                *e = e.checked_mul(exponent).ok_or_else(|| self.out_of_range())?;
            }
        }
        Ok(d)
    }

    fn atom(&mut self) -> Result<Dimensionality, UnitError> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| self.syntax("unexpected end of expression"))?;
        self.at += 1;
        match token {
            Token::Number(_) => Ok(NONE),
            Token::Symbol(symbol) => self
                .registry
                .lookup(&symbol)
                .ok_or(UnitError::UnknownUnit(symbol)),
            Token::Open => {
                let d = self.product()?;
                if self.peek() != Some(&Token::Close) {
                    return Err(self.syntax("unbalanced parenthesis"));
                }
                self.at += 1;
                Ok(d)
            }
            _ => Err(self.syntax("expected a unit")),
        }
    }
}

/// The unit categories an NXDL field can declare in its `units` attribute.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnitCategory {
    Angle,
    Any,
    Area,
    Capacitance,
    Charge,
    Count,
    CrossSection,
    Current,
    Dimensionless,
    Emittance,
    Energy,
    Flux,
    Frequency,
    Length,
    MagneticFlux,
    MagneticField,
    Mass,
    MassDensity,
    MolecularWeight,
    Period,
    PerArea,
    PerLength,
    Power,
    Pressure,
    Pulses,
    Resistance,
    ScatteringLengthDensity,
    SolidAngle,
    Temperature,
    Time,
    TimeOfFlight,
    Transformation,
    Unitless,
    Voltage,
    Volume,
    Wavelength,
    Wavenumber,
}

impl UnitCategory {
    const NAMES: [(UnitCategory, &'static str); 37] = [
        (Self::Angle, "NX_ANGLE"),
        (Self::Any, "NX_ANY"),
        (Self::Area, "NX_AREA"),
        (Self::Capacitance, "NX_CAPACITANCE"),
        (Self::Charge, "NX_CHARGE"),
        (Self::Count, "NX_COUNT"),
        (Self::CrossSection, "NX_CROSS_SECTION"),
        (Self::Current, "NX_CURRENT"),
        (Self::Dimensionless, "NX_DIMENSIONLESS"),
        (Self::Emittance, "NX_EMITTANCE"),
        (Self::Energy, "NX_ENERGY"),
        (Self::Flux, "NX_FLUX"),
        (Self::Frequency, "NX_FREQUENCY"),
        (Self::Length, "NX_LENGTH"),
        (Self::MagneticFlux, "NX_MAGNETIC_FLUX"),
        (Self::MagneticField, "NX_MAGNETIC_FIELD"),
        (Self::Mass, "NX_MASS"),
        (Self::MassDensity, "NX_MASS_DENSITY"),
        (Self::MolecularWeight, "NX_MOLECULAR_WEIGHT"),
        (Self::Period, "NX_PERIOD"),
        (Self::PerArea, "NX_PER_AREA"),
        (Self::PerLength, "NX_PER_LENGTH"),
        (Self::Power, "NX_POWER"),
        (Self::Pressure, "NX_PRESSURE"),
        (Self::Pulses, "NX_PULSES"),
        (Self::Resistance, "NX_RESISTANCE"),
        (Self::ScatteringLengthDensity, "NX_SCATTERING_LENGTH_DENSITY"),
        (Self::SolidAngle, "NX_SOLID_ANGLE"),
        (Self::Temperature, "NX_TEMPERATURE"),
        (Self::Time, "NX_TIME"),
        (Self::TimeOfFlight, "NX_TIME_OF_FLIGHT"),
        (Self::Transformation, "NX_TRANSFORMATION"),
        (Self::Unitless, "NX_UNITLESS"),
        (Self::Voltage, "NX_VOLTAGE"),
        (Self::Volume, "NX_VOLUME"),
        (Self::Wavelength, "NX_WAVELENGTH"),
        (Self::Wavenumber, "NX_WAVENUMBER"),
    ];

    pub fn from_nx_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(category, _)| *category)
    }

    pub fn nx_name(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(category, _)| *category == self)
            .map_or("NX_ANY", |(_, name)| name)
    }

    /// The canonical dimensionality, or `None` for the categories decided by rule rather than
    /// by dimension (`any`, `unitless`, `dimensionless`, `transformation`).
    pub fn dimensionality(self) -> Option<Dimensionality> {
        use UnitCategory::*;

        Some(match self {
            Any | Dimensionless | Unitless | Transformation => return None,
            Angle => ANGLE,
            Area | CrossSection => AREA,
            Capacitance => CAPACITANCE,
            Charge => CHARGE,
            Count | Pulses => NONE,
            Current => CURRENT,
            Emittance => dim([(L, 1), (A, 1)]),
            Energy => ENERGY,
            Flux => dim([(L, -2), (T, -1)]),
            Frequency => FREQUENCY,
            Length | Wavelength => LENGTH,
            MagneticFlux => MAGNETIC_FLUX,
            MagneticField => MAGNETIC_FIELD,
            Mass => MASS,
            MassDensity => dim([(M, 1), (L, -3)]),
            MolecularWeight => dim([(M, 1), (N, -1)]),
            Period | Time | TimeOfFlight => TIME,
            PerArea | ScatteringLengthDensity => dim([(L, -2)]),
            PerLength | Wavenumber => dim([(L, -1)]),
            Power => POWER,
            Pressure => PRESSURE,
            Resistance => RESISTANCE,
            SolidAngle => SOLID_ANGLE,
            Temperature => TEMPERATURE,
            Voltage => VOLTAGE,
            Volume => VOLUME,
        })
    }

    /// Whether a field of this category needs no `@units` attribute.
    pub fn is_unitless(self) -> bool {
        matches!(self, Self::Unitless | Self::Dimensionless)
    }
}

impl fmt::Display for UnitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.nx_name())
    }
}
