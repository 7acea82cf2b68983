use crate::core::models::batch::AtomSystemBatch;
use crate::core::models::statistics::DatasetStatistics;
use crate::core::ops::scatter::reduce_to_molecules;
use candle_core::{Device, Tensor};

/// Maps raw per-molecule network outputs onto the dataset's energy scale.
///
/// `E = raw · stddev + mean + Σ_atoms E_self(Z)`. The self-energy sum depends on composition only,
/// so it is a constant of the graph and carries no gradient.
#[derive(Debug, Clone)]
pub struct EnergyScaling {
    mean: f64,
    stddev: f64,
    self_energy_table: Vec<f64>,
}

impl EnergyScaling {
    pub fn new(statistics: &DatasetStatistics) -> Self {
        Self {
            mean: statistics.scaling_mean,
            stddev: statistics.scaling_stddev,
            self_energy_table: statistics.atomic_self_energies.lookup_table(),
        }
    }

    pub fn rescale(&self, raw_energy: &Tensor) -> candle_core::Result<Tensor> {
        raw_energy.affine(self.stddev, self.mean)
    }

    /// Per-atom self energies gathered from the table, `[N]`.
    pub fn atomic_self_energies(
        &self,
        batch: &AtomSystemBatch,
        device: &Device,
    ) -> candle_core::Result<Tensor> {
        let values: Vec<f64> = batch
            .atomic_numbers()
            .iter()
            .map(|&z| self.self_energy_table.get(usize::from(z)).copied().unwrap_or(0.0))
            .collect();
        Tensor::from_vec(values, batch.number_of_atoms(), device)
    }

    /// Sum of self energies per molecule, `[M]`.
    pub fn molecular_self_energies(
        &self,
        batch: &AtomSystemBatch,
        device: &Device,
    ) -> candle_core::Result<Tensor> {
        reduce_to_molecules(
            &self.atomic_self_energies(batch, device)?,
            &batch.subsystem_indices_tensor(device)?,
            batch.number_of_molecules(),
        )
    }

    /// Subtracts each molecule's self-energy sum from reference energies.
    pub fn remove_self_energies(
        &self,
        batch: &AtomSystemBatch,
        energies: &[f64],
    ) -> candle_core::Result<Vec<f64>> {
        if energies.len() != batch.number_of_molecules() {
            candle_core::bail!(
                "expected {} molecular energies, found {}",
                batch.number_of_molecules(),
                energies.len()
            );
        }
        let offsets = self
            .molecular_self_energies(batch, &Device::Cpu)?
            .to_vec1::<f64>()?;
        Ok(energies.iter().zip(offsets).map(|(e, o)| e - o).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::statistics::AtomicSelfEnergies;
    use nalgebra::Point3;

    fn statistics() -> DatasetStatistics {
        DatasetStatistics {
            scaling_mean: -2.0,
            scaling_stddev: 0.5,
            atomic_self_energies: AtomicSelfEnergies::from_symbols([("H", -1.5), ("O", -75.0)])
                .unwrap(),
        }
    }

    fn batch() -> AtomSystemBatch {
        AtomSystemBatch::neutral(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.1, 0.0, 0.0),
                Point3::new(0.0, 0.1, 0.0),
                Point3::new(2.0, 0.0, 0.0),
                Point3::new(2.1, 0.0, 0.0),
            ],
            vec![8, 1, 1, 6, 1],
            vec![0, 0, 0, 1, 1],
        )
        .unwrap()
    }

    #[test]
    fn rescale_applies_stddev_then_mean() {
        let scaling = EnergyScaling::new(&statistics());
        let raw = Tensor::from_vec(vec![4.0, -2.0], 2, &Device::Cpu).unwrap();
        let rescaled = scaling.rescale(&raw).unwrap().to_vec1::<f64>().unwrap();
        assert_eq!(rescaled, vec![0.0, -3.0]);
    }

    #[test]
    fn molecular_self_energies_sum_the_table_with_missing_elements_at_zero() {
        let scaling = EnergyScaling::new(&statistics());
        let totals = scaling
            .molecular_self_energies(&batch(), &Device::Cpu)
            .unwrap()
            .to_vec1::<f64>()
            .unwrap();
        assert_eq!(totals, vec![-78.0, -1.5]);
    }

    #[test]
    fn removing_self_energies_inverts_adding_them() {
        let scaling = EnergyScaling::new(&statistics());
        let stripped = scaling.remove_self_energies(&batch(), &[-80.0, -2.0]).unwrap();
        assert_eq!(stripped, vec![-2.0, -0.5]);
        assert!(scaling.remove_self_energies(&batch(), &[1.0]).is_err());
    }
}
