pub mod evaluate;
pub mod fit_self_energies;
pub mod pairs;
