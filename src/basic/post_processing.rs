//! Merges island solutions into whole-grid arrays and derives branch quantities.

use nalgebra::{Complex, DVector};
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;
use tabled::{Table, settings::Style};

mod res_display;
use res_display::*;

use super::{
    admittance::AdmittanceSystem,
    bus_types::{BusType, SupportLevel},
    diagnostics::Diagnostics,
    dispatcher::ConvergenceReport,
    methods::MethodKind,
    snapshot::NetworkSnapshot,
    sparse::cast::Cast,
};

/// Per-branch results of one island, in island-local numbering.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchFlows {
    /// Power entering the branch at the from end (p.u.).
    pub sf: DVector<Complex64>,
    pub st: DVector<Complex64>,
    pub i_f: DVector<Complex64>,
    pub i_t: DVector<Complex64>,
    /// `sf + st`.
    pub losses: DVector<Complex64>,
    /// `|sf|` over the rating; zero for unrated branches.
    pub loading: DVector<f64>,
}

impl BranchFlows {
    pub fn zeros(n: usize) -> Self {
        let zero = DVector::from_element(n, Complex::new(0.0, 0.0));
        Self {
            sf: zero.clone(),
            st: zero.clone(),
            i_f: zero.clone(),
            i_t: zero.clone(),
            losses: zero,
            loading: DVector::zeros(n),
        }
    }

    /// `rates` are in MVA, the flows in p.u. on `sbase`.
    pub fn compute(adm: &AdmittanceSystem, v: &DVector<Complex64>, rates: &[f64], sbase: f64) -> Self {
        let cf: CscMatrix<Complex64> = adm.cf.cast();
        let ct: CscMatrix<Complex64> = adm.ct.cast();
        let i_f = &adm.yf * v;
        let i_t = &adm.yt * v;
        let sf = (&cf * v).component_mul(&i_f.conjugate());
        let st = (&ct * v).component_mul(&i_t.conjugate());
        let loading = DVector::from_iterator(
            rates.len(),
            rates
                .iter()
                .zip(sf.iter())
                .map(|(&rate, s)| if rate > 0.0 { s.norm() * sbase / rate } else { 0.0 }),
        );
        Self {
            losses: &sf + &st,
            sf,
            st,
            i_f,
            i_t,
            loading,
        }
    }
}

/// Solution of one island, in island-local numbering.
#[derive(Debug, Clone, PartialEq)]
pub struct IslandSolution {
    pub index: usize,
    /// Global indices of the island's buses and branches.
    pub buses: Vec<usize>,
    pub branches: Vec<usize>,
    /// False when the island has no reference bus or unusable data.
    pub solvable: bool,
    pub converged: bool,
    pub residual: f64,
    pub method: Option<MethodKind>,
    pub level: Option<SupportLevel>,
    /// Bus types after the reactive limit loop.
    pub bus_types: Vec<BusType>,
    pub v: DVector<Complex64>,
    /// Calculated injections `V conj(Ybus V)`.
    pub s: DVector<Complex64>,
    pub taps: Vec<f64>,
    pub flows: BranchFlows,
    pub report: ConvergenceReport,
}

impl IslandSolution {
    pub fn is_trivial(&self) -> bool {
        self.buses.len() <= 1
    }
}

/// Whole-grid result of one solve, indexed like the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct WholeGridSolution {
    pub sbase: f64,
    pub v: DVector<Complex64>,
    pub s: DVector<Complex64>,
    /// `None` for buses outside every solved island.
    pub bus_types: Vec<Option<BusType>>,
    pub island_of_bus: Vec<Option<usize>>,
    pub sf: DVector<Complex64>,
    pub st: DVector<Complex64>,
    pub i_f: DVector<Complex64>,
    pub i_t: DVector<Complex64>,
    pub losses: DVector<Complex64>,
    pub loading: DVector<f64>,
    pub taps: Vec<f64>,
    /// Active power leaving the from terminal of every HVDC link (p.u.).
    pub hvdc_p: Vec<f64>,
    pub islands: Vec<IslandSolution>,
    pub diagnostics: Diagnostics,
    /// True when every island with more than one bus converged.
    pub converged: bool,
}

impl WholeGridSolution {
    /// Scatters island results into snapshot-sized arrays. Buses that no island
    /// covers keep `1∠0` and zero injection.
    pub fn stitch(
        snapshot: &NetworkSnapshot,
        islands: Vec<IslandSolution>,
        hvdc_p: Vec<f64>,
        diagnostics: Diagnostics,
    ) -> Self {
        let (n_bus, n_br) = (snapshot.n_bus(), snapshot.n_branch());
        let zero = Complex::new(0.0, 0.0);
        let mut out = Self {
            sbase: snapshot.sbase,
            v: DVector::from_element(n_bus, Complex::new(1.0, 0.0)),
            s: DVector::from_element(n_bus, zero),
            bus_types: vec![None; n_bus],
            island_of_bus: vec![None; n_bus],
            sf: DVector::from_element(n_br, zero),
            st: DVector::from_element(n_br, zero),
            i_f: DVector::from_element(n_br, zero),
            i_t: DVector::from_element(n_br, zero),
            losses: DVector::from_element(n_br, zero),
            loading: DVector::zeros(n_br),
            taps: snapshot.branches.iter().map(|b| b.tap_module).collect(),
            hvdc_p,
            islands: Vec::new(),
            diagnostics,
            converged: true,
        };
        for island in &islands {
            for (local, &global) in island.buses.iter().enumerate() {
                out.v[global] = island.v[local];
                out.s[global] = island.s[local];
                out.bus_types[global] = island.bus_types.get(local).copied();
                out.island_of_bus[global] = Some(island.index);
            }
            for (local, &global) in island.branches.iter().enumerate() {
                out.sf[global] = island.flows.sf[local];
                out.st[global] = island.flows.st[local];
                out.i_f[global] = island.flows.i_f[local];
                out.i_t[global] = island.flows.i_t[local];
                out.losses[global] = island.flows.losses[local];
                out.loading[global] = island.flows.loading[local];
                out.taps[global] = island.taps[local];
            }
            if !island.is_trivial() && !island.converged {
                out.converged = false;
            }
        }
        out.islands = islands;
        out
    }

    pub fn vm(&self) -> DVector<f64> {
        self.v.map(|e| e.norm())
    }

    pub fn va(&self) -> DVector<f64> {
        self.v.map(|e| e.arg())
    }

    /// Sum of the branch losses (p.u.).
    pub fn total_losses(&self) -> Complex64 {
        self.losses.sum()
    }

    /// Bus results as a markdown table, powers in MW/MVAr.
    pub fn bus_table(&self) -> String {
        let rows: Vec<BusResTable> = (0..self.v.len())
            .map(|i| BusResTable {
                bus: i,
                island: self.island_of_bus[i].map_or_else(|| "-".to_string(), |k| k.to_string()),
                bus_type: self.bus_types[i].map_or_else(|| "-".to_string(), |t| t.to_string()),
                vm_pu: FloatWrapper::new(self.v[i].norm(), 4),
                va_degree: FloatWrapper::new(self.v[i].arg().to_degrees(), 3),
                p_mw: FloatWrapper::new(self.s[i].re * self.sbase, 3),
                q_mvar: FloatWrapper::new(self.s[i].im * self.sbase, 3),
            })
            .collect();
        Table::new(rows).with(Style::markdown()).to_string()
    }

    /// Branch results as a markdown table, powers in MW/MVAr.
    pub fn branch_table(&self, snapshot: &NetworkSnapshot) -> String {
        let rows: Vec<BranchResTable> = snapshot
            .branches
            .iter()
            .enumerate()
            .map(|(k, br)| BranchResTable {
                branch: k,
                from: br.from,
                to: br.to,
                p_from_mw: FloatWrapper::new(self.sf[k].re * self.sbase, 3),
                q_from_mvar: FloatWrapper::new(self.sf[k].im * self.sbase, 3),
                p_to_mw: FloatWrapper::new(self.st[k].re * self.sbase, 3),
                q_to_mvar: FloatWrapper::new(self.st[k].im * self.sbase, 3),
                pl_mw: FloatWrapper::new(self.losses[k].re * self.sbase, 3),
                ql_mvar: FloatWrapper::new(self.losses[k].im * self.sbase, 3),
                i_from_pu: FloatWrapper::new(self.i_f[k].norm(), 4),
                tap: FloatWrapper::new(self.taps[k], 4),
                loading_percent: FloatWrapper::new(self.loading[k] * 100.0, 1),
            })
            .collect();
        Table::new(rows).with(Style::markdown()).to_string()
    }
}
