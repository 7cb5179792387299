//! Integration tests for the solver session: configuration, single solves,
//! preconditioner lifecycle and result classification.

use aksp::{
    AzOption, AzParam, CsrMatrix, KError, KrylovKernel, KrylovOperator, KspContext, LinearProblem, Options, Params,
    PcState, PrecondKind, Preconditioner, ProblemDifficulty, SolveOutcome, SolverKind, Status, StatusKey,
    SubdomainSolve,
};
use approx::assert_abs_diff_eq;
use faer::Mat;
use faer::linalg::solvers::SolveCore;
use rand::Rng;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Symmetric pentadiagonal matrix with 6 on the diagonal, -1 on the first and
/// second off-diagonals.
fn pentadiagonal(n: usize) -> CsrMatrix {
    let mut t = Vec::new();
    for i in 0..n {
        t.push((i, i, 6.0));
        for d in 1..=2 {
            if i >= d {
                t.push((i, i - d, -1.0));
            }
            if i + d < n {
                t.push((i, i + d, -1.0));
            }
        }
    }
    CsrMatrix::from_triplets(n, &t).unwrap()
}

/// Random SPD matrix `A = Mᵀ M + n I` and a random right-hand side.
fn random_spd(n: usize) -> (Mat<f64>, Vec<f64>) {
    let mut rng = rand::thread_rng();
    let data: Vec<f64> = (0..n * n).map(|_| rng.r#gen()).collect();
    let m = Mat::from_fn(n, n, |i, j| data[j * n + i]);
    let a = Mat::from_fn(n, n, |i, j| {
        let mtm: f64 = (0..n).map(|k| m[(k, i)] * m[(k, j)]).sum();
        if i == j { mtm + n as f64 } else { mtm }
    });
    let b: Vec<f64> = (0..n).map(|_| rng.r#gen()).collect();
    (a, b)
}

fn direct_solve(a: &Mat<f64>, b: &[f64]) -> Vec<f64> {
    let n = b.len();
    let mut x = b.to_vec();
    let lu = faer::linalg::solvers::FullPivLu::new(a.as_ref());
    lu.solve_in_place_with_conj(faer::Conj::No, faer::MatMut::from_column_major_slice_mut(&mut x, n, 1));
    x
}

#[test]
fn cg_with_one_jacobi_step_solves_pentadiagonal_system() {
    init_logger();
    let a = pentadiagonal(5);
    let mut x = vec![0.0; 5];
    let b = vec![1.0; 5];
    let mut ksp = KspContext::new();
    ksp.set_option(AzOption::Solver, SolverKind::Cg.code());
    ksp.set_option(AzOption::Precond, PrecondKind::Jacobi.code());
    ksp.set_option(AzOption::PolyOrd, 1);
    let outcome = ksp.solve(&a, &mut x, &b, 50, 1e-10).unwrap();
    assert_eq!(outcome.code(), 0);
    assert!(ksp.true_residual() < 1e-8);
    assert!(ksp.num_iters() <= 10);
    assert_eq!(ksp.preconditioner_state(), PcState::Absent);
}

#[test]
fn random_spd_matches_direct_solve() {
    let n = 12;
    let (a_dense, b) = random_spd(n);
    let a = CsrMatrix::from_dense(&a_dense).unwrap();
    let mut x = vec![0.0; n];
    let mut ksp = KspContext::new();
    ksp.set_option(AzOption::Solver, SolverKind::Cg.code());
    ksp.set_option(AzOption::Precond, PrecondKind::DomDecomp.code());
    ksp.set_option(AzOption::SubdomainSolve, SubdomainSolve::Ilu.code());
    assert_eq!(ksp.solve(&a, &mut x, &b, 200, 1e-12).unwrap(), SolveOutcome::Converged);
    let x_direct = direct_solve(&a_dense, &b);
    let x = ksp.solution().unwrap();
    for i in 0..n {
        assert_abs_diff_eq!(x[i], x_direct[i], epsilon = 1e-8);
    }
}

#[test]
fn linear_problem_presets_drive_the_solve() {
    let a = pentadiagonal(20);
    let mut x = vec![0.0; 20];
    let b: Vec<f64> = (0..20).map(|i| (i as f64).sin()).collect();
    let mut ksp = KspContext::new();
    let problem = LinearProblem::new(&a, &mut x, &b).with_difficulty(ProblemDifficulty::Moderate).with_symmetric(true);
    ksp.configure_problem(problem).unwrap();
    assert_eq!(ksp.options().solver_kind().unwrap(), SolverKind::Cg);
    assert_eq!(ksp.iterate(100, 1e-10).unwrap(), SolveOutcome::Converged);
    assert!(ksp.scaled_residual() <= 1e-9);
}

#[test]
fn incomplete_problem_is_rejected() {
    let a = pentadiagonal(3);
    let b = vec![1.0; 3];
    let mut ksp = KspContext::new();
    let problem = LinearProblem { operator: Some(&a), rhs: Some(&b[..]), ..LinearProblem::default() };
    let err = ksp.configure_problem(problem).unwrap_err();
    assert!(matches!(err, KError::InvalidArgument(_)));
}

#[test]
fn missing_user_preconditioner_is_never_substituted() {
    let a = pentadiagonal(4);
    let mut x = vec![0.0; 4];
    let b = vec![1.0; 4];
    let mut ksp = KspContext::new();
    ksp.set_option(AzOption::Precond, PrecondKind::User.code());
    ksp.configure(&a, &mut x, &b).unwrap();
    let err = ksp.iterate(20, 1e-8).unwrap_err();
    assert!(matches!(err, KError::UnsupportedPreconditioner { .. }));
    assert_eq!(err.code(), -2);
    assert_eq!(ksp.solution().unwrap(), &[0.0; 4]);
}

#[test]
fn destroy_preconditioner_is_idempotent() {
    let a = pentadiagonal(6);
    let mut x = vec![0.0; 6];
    let b = vec![1.0; 6];
    let mut ksp = KspContext::new();
    ksp.set_option(AzOption::Precond, PrecondKind::DomDecomp.code());
    ksp.destroy_preconditioner();
    ksp.configure(&a, &mut x, &b).unwrap();
    ksp.construct_preconditioner().unwrap();
    ksp.destroy_preconditioner();
    ksp.destroy_preconditioner();
    assert_eq!(ksp.preconditioner_state(), PcState::Absent);
    assert!(ksp.construct_preconditioner().is_ok());
}

#[test]
fn out_of_range_solver_code_is_a_parameter_error() {
    let a = pentadiagonal(3);
    let mut x = vec![0.0; 3];
    let b = vec![1.0; 3];
    let mut ksp = KspContext::new();
    ksp.set_option(AzOption::Solver, 17);
    ksp.configure(&a, &mut x, &b).unwrap();
    assert_eq!(ksp.iterate(10, 1e-8).unwrap_err().code(), -1);
}

#[test]
fn negative_tolerance_is_reported_by_the_kernel() {
    let a = pentadiagonal(3);
    let mut x = vec![0.0; 3];
    let b = vec![1.0; 3];
    let mut ksp = KspContext::new();
    ksp.configure(&a, &mut x, &b).unwrap();
    let err = ksp.iterate(10, -1.0).unwrap_err();
    assert!(matches!(err, KError::Param { .. }));
    assert_eq!(ksp.params()[AzParam::Tol], -1.0);
}

/// Writes a termination code the session does not know.
struct UnknownCode;

impl KrylovKernel for UnknownCode {
    fn solve<M: KrylovOperator>(
        &mut self,
        _op: &M,
        _pc: Option<&dyn Preconditioner>,
        _b: &[f64],
        _x: &mut [f64],
        _options: &Options,
        _params: &Params,
        status: &mut Status,
    ) {
        status.set(StatusKey::Why, 99.0);
    }
}

#[test]
fn unknown_termination_code_is_internal() {
    let a = pentadiagonal(3);
    let mut x = vec![0.0; 3];
    let b = vec![1.0; 3];
    let mut ksp = KspContext::with_kernel(UnknownCode);
    ksp.configure(&a, &mut x, &b).unwrap();
    let err = ksp.iterate(10, 1e-8).unwrap_err();
    assert_eq!(err, KError::Internal { code: 99.0 });
    assert_eq!(err.code(), -5);
}
