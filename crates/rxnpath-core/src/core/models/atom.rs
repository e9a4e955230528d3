use super::element::Element;
use super::ids::AtomId;
use nalgebra::Point3;

#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub id: AtomId,                      // Caller-chosen identifier, stable across reactions
    pub element: Element,                // Chemical element
    pub formal_charge: i8,               // Formal charge in units of e
    pub position: Option<Point3<f64>>,   // Cartesian coordinates (Å), when known
}

impl Atom {
    pub fn new(id: impl Into<AtomId>, element: Element) -> Self {
        Self {
            id: id.into(),
            element,
            formal_charge: 0,
            position: None,
        }
    }

    pub fn with_charge(mut self, formal_charge: i8) -> Self {
        self.formal_charge = formal_charge;
        self
    }

    pub fn with_position(mut self, position: Point3<f64>) -> Self {
        self.position = Some(position);
        self
    }
}
