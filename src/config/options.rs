//! Solver options and parameters.
//!
//! Integer options and floating-point parameters live in fixed-size arrays
//! indexed by the closed enums [`AzOption`] and [`AzParam`], so no raw index
//! arithmetic leaks into callers. Option values that name a method
//! (solver, preconditioner, subdomain solve) are stored as integer codes and
//! range-checked when read back through the typed accessors.

use std::fmt;
use std::ops::Index;
use std::str::FromStr;

use bitflags::bitflags;

use crate::config::status::TerminationReason;
use crate::error::KError;

macro_rules! keyed_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
            pub const COUNT: usize = $name::ALL.len();

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = KError;
            fn from_str(s: &str) -> Result<Self, KError> {
                let key = s.trim().to_ascii_lowercase();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.name() == key)
                    .ok_or_else(|| KError::InvalidArgument(format!(concat!("unknown ", stringify!($name), " `{}`"), s)))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

keyed_enum! {
    /// Integer-valued solver options.
    AzOption {
        Solver => "solver",
        Precond => "precond",
        SubdomainSolve => "subdomain_solve",
        MaxIter => "max_iter",
        GraphFill => "graph_fill",
        Kspace => "kspace",
        Overlap => "overlap",
        RecursionLevel => "recursion_level",
        PreCalc => "pre_calc",
        PolyOrd => "poly_ord",
        Output => "output",
    }
}

keyed_enum! {
    /// Floating-point solver parameters.
    AzParam {
        Tol => "tol",
        Drop => "drop",
        IlutFill => "ilut_fill",
        Athresh => "athresh",
        Rthresh => "rthresh",
        Omega => "omega",
    }
}

impl AzOption {
    /// Options whose change invalidates a built preconditioner.
    pub fn shapes_preconditioner(self) -> bool {
        matches!(
            self,
            AzOption::Precond | AzOption::SubdomainSolve | AzOption::GraphFill | AzOption::Overlap | AzOption::PolyOrd
        )
    }
}

impl AzParam {
    /// Parameters whose change invalidates a built preconditioner.
    pub fn shapes_preconditioner(self) -> bool {
        !matches!(self, AzParam::Tol)
    }
}

macro_rules! coded_kind {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $code:literal => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn code(self) -> i32 {
                match self {
                    $($name::$variant => $code),+
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl TryFrom<i32> for $name {
            type Error = KError;
            fn try_from(code: i32) -> Result<Self, KError> {
                match code {
                    $($code => Ok($name::$variant),)+
                    other => Err(KError::Param {
                        why: TerminationReason::Param.code(),
                        msg: format!(concat!(stringify!($name), " code {} out of range"), other),
                    }),
                }
            }
        }

        impl FromStr for $name {
            type Err = KError;
            fn from_str(s: &str) -> Result<Self, KError> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(KError::InvalidArgument(format!(concat!("unknown ", stringify!($name), " `{}`"), s))),
                }
            }
        }
    };
}

coded_kind! {
    /// Krylov method.
    SolverKind {
        Cg = 0 => "cg",
        Gmres = 1 => "gmres",
        Bicgstab = 2 => "bicgstab",
    }
}

coded_kind! {
    /// Preconditioner family.
    PrecondKind {
        None = 0 => "none",
        Jacobi = 1 => "jacobi",
        DomDecomp = 2 => "dom_decomp",
        User = 3 => "user",
    }
}

coded_kind! {
    /// Solve applied on each subdomain of a domain-decomposition preconditioner.
    SubdomainSolve {
        Lu = 0 => "lu",
        Ilu = 1 => "ilu",
        Ilut = 2 => "ilut",
        Bilu = 3 => "bilu",
    }
}

coded_kind! {
    /// Whether the next solve computes a fresh preconditioner or reuses the built one.
    PreCalc {
        Calc = 0 => "calc",
        Reuse = 1 => "reuse",
    }
}

bitflags! {
    /// Log categories enabled through [`AzOption::Output`].
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct Diagnostics: u32 {
        const SUMMARY  = 0b001;
        const WARNINGS = 0b010;
        const ADAPTIVE = 0b100;
    }
}

/// Integer options, indexed by [`AzOption`].
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    values: [i32; AzOption::COUNT],
}

impl Default for Options {
    fn default() -> Self {
        let mut o = Options { values: [0; AzOption::COUNT] };
        o.set(AzOption::Solver, SolverKind::Gmres.code());
        o.set(AzOption::Precond, PrecondKind::None.code());
        o.set(AzOption::SubdomainSolve, SubdomainSolve::Ilut.code());
        o.set(AzOption::MaxIter, 500);
        o.set(AzOption::GraphFill, 0);
        o.set(AzOption::Kspace, 30);
        o.set(AzOption::Overlap, 0);
        o.set(AzOption::RecursionLevel, 0);
        o.set(AzOption::PreCalc, PreCalc::Calc.code());
        o.set(AzOption::PolyOrd, 3);
        o.set(AzOption::Output, (Diagnostics::SUMMARY | Diagnostics::WARNINGS).bits() as i32);
        o
    }
}

impl Index<AzOption> for Options {
    type Output = i32;
    fn index(&self, key: AzOption) -> &i32 {
        &self.values[key as usize]
    }
}

impl Options {
    pub fn get(&self, key: AzOption) -> i32 {
        self[key]
    }

    pub fn set(&mut self, key: AzOption, value: i32) {
        self.values[key as usize] = value;
    }

    pub fn solver_kind(&self) -> Result<SolverKind, KError> {
        SolverKind::try_from(self[AzOption::Solver])
    }

    pub fn precond_kind(&self) -> Result<PrecondKind, KError> {
        PrecondKind::try_from(self[AzOption::Precond])
    }

    pub fn subdomain_solve(&self) -> Result<SubdomainSolve, KError> {
        SubdomainSolve::try_from(self[AzOption::SubdomainSolve])
    }

    pub fn pre_calc(&self) -> Result<PreCalc, KError> {
        PreCalc::try_from(self[AzOption::PreCalc])
    }

    /// Non-negative option read as a count; negative values are a parameter error.
    pub fn count(&self, key: AzOption) -> Result<usize, KError> {
        usize::try_from(self[key]).map_err(|_| KError::Param {
            why: TerminationReason::Param.code(),
            msg: format!("option {key} = {} must be non-negative", self[key]),
        })
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics::from_bits_truncate(self[AzOption::Output] as u32)
    }
}

/// Floating-point parameters, indexed by [`AzParam`].
#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    values: [f64; AzParam::COUNT],
}

impl Default for Params {
    fn default() -> Self {
        let mut p = Params { values: [0.0; AzParam::COUNT] };
        p.set(AzParam::Tol, 1e-6);
        p.set(AzParam::Drop, 0.0);
        p.set(AzParam::IlutFill, 1.0);
        p.set(AzParam::Athresh, 0.0);
        p.set(AzParam::Rthresh, 1.0);
        p.set(AzParam::Omega, 1.0);
        p
    }
}

impl Index<AzParam> for Params {
    type Output = f64;
    fn index(&self, key: AzParam) -> &f64 {
        &self.values[key as usize]
    }
}

impl Params {
    pub fn get(&self, key: AzParam) -> f64 {
        self[key]
    }

    pub fn set(&mut self, key: AzParam, value: f64) {
        self.values[key as usize] = value;
    }
}

/// Saturating conversion of an iteration cap into an option value.
pub(crate) fn clamp_count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}
