use std::ops::{Add, AddAssign};

/// Force-field energy split by interaction class (kcal/mol).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnergyTerm {
    pub bond: f64,
    pub angle: f64,
    pub repulsion: f64,
}

impl EnergyTerm {
    pub fn new(bond: f64, angle: f64, repulsion: f64) -> Self {
        Self {
            bond,
            angle,
            repulsion,
        }
    }

    #[inline]
    pub fn total(&self) -> f64 {
        self.bond + self.angle + self.repulsion
    }
}

impl Add for EnergyTerm {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            bond: self.bond + rhs.bond,
            angle: self.angle + rhs.angle,
            repulsion: self.repulsion + rhs.repulsion,
        }
    }
}

impl AddAssign for EnergyTerm {
    fn add_assign(&mut self, rhs: Self) {
        self.bond += rhs.bond;
        self.angle += rhs.angle;
        self.repulsion += rhs.repulsion;
    }
}
