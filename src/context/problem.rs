//! Linear problem bundle and difficulty presets.

use crate::config::{AzOption, AzParam, Options, Params, PrecondKind, SolverKind, SubdomainSolve};

/// Caller's assessment of how hard a problem is to solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProblemDifficulty {
    Easy,
    Moderate,
    Hard,
    #[default]
    Unsure,
}

/// Operator, left-hand side and right-hand side, any of which may be missing
/// until the bundle is handed to a session.
pub struct LinearProblem<'a, A> {
    pub operator: Option<&'a A>,
    pub lhs: Option<&'a mut [f64]>,
    pub rhs: Option<&'a [f64]>,
    pub difficulty: ProblemDifficulty,
    pub symmetric: bool,
}

impl<A> Default for LinearProblem<'_, A> {
    fn default() -> Self {
        Self { operator: None, lhs: None, rhs: None, difficulty: ProblemDifficulty::Unsure, symmetric: false }
    }
}

impl<'a, A> LinearProblem<'a, A> {
    pub fn new(operator: &'a A, lhs: &'a mut [f64], rhs: &'a [f64]) -> Self {
        Self { operator: Some(operator), lhs: Some(lhs), rhs: Some(rhs), ..Self::default() }
    }

    pub fn with_difficulty(mut self, difficulty: ProblemDifficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_symmetric(mut self, symmetric: bool) -> Self {
        self.symmetric = symmetric;
        self
    }
}

/// Option presets for a difficulty level.
///
/// Symmetric problems run CG; the preconditioner grows from one Jacobi step
/// to domain decomposition with incomplete factors. Nonsymmetric hard
/// problems get ILUT with extra fill, a drop tolerance and a large Krylov
/// space.
pub fn set_problem_options(options: &mut Options, params: &mut Params, difficulty: ProblemDifficulty, symmetric: bool) {
    use ProblemDifficulty::*;
    if symmetric {
        options.set(AzOption::Solver, SolverKind::Cg.code());
        match difficulty {
            Easy => {
                options.set(AzOption::PolyOrd, 1);
                options.set(AzOption::Precond, PrecondKind::Jacobi.code());
            }
            Moderate => {
                options.set(AzOption::Precond, PrecondKind::DomDecomp.code());
                options.set(AzOption::SubdomainSolve, SubdomainSolve::Ilu.code());
            }
            Hard | Unsure => {
                options.set(AzOption::Precond, PrecondKind::DomDecomp.code());
                options.set(AzOption::SubdomainSolve, SubdomainSolve::Ilu.code());
                params.set(AzParam::Omega, 1.2);
            }
        }
    } else {
        match difficulty {
            Easy => {
                options.set(AzOption::PolyOrd, 1);
                options.set(AzOption::Precond, PrecondKind::Jacobi.code());
                options.set(AzOption::Solver, SolverKind::Bicgstab.code());
            }
            Moderate => {
                options.set(AzOption::Precond, PrecondKind::DomDecomp.code());
                options.set(AzOption::SubdomainSolve, SubdomainSolve::Ilu.code());
                options.set(AzOption::Solver, SolverKind::Gmres.code());
            }
            Hard | Unsure => {
                options.set(AzOption::Precond, PrecondKind::DomDecomp.code());
                options.set(AzOption::SubdomainSolve, SubdomainSolve::Ilut.code());
                options.set(AzOption::Overlap, 1);
                params.set(AzParam::IlutFill, 3.0);
                params.set(AzParam::Drop, 0.01);
                options.set(AzOption::Kspace, 1000);
            }
        }
    }
}
