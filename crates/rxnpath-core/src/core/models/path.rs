use super::geometry::Geometry;
use nalgebra::DVector;

#[derive(Debug, Clone, PartialEq)]
pub struct PathImage {
    pub geometry: Geometry,
    pub energy: Option<f64>,
}

/// Ordered sequence of geometries from reactant-like to product-like.
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionPath {
    images: Vec<PathImage>,
}

impl ReactionPath {
    /// Returns `None` when `geometries` is empty or mixes incompatible structures.
    pub fn new(geometries: Vec<Geometry>) -> Option<Self> {
        let first = geometries.first()?;
        if geometries.iter().any(|g| !g.is_compatible_with(first)) {
            return None;
        }
        Some(Self {
            images: geometries
                .into_iter()
                .map(|geometry| PathImage {
                    geometry,
                    energy: None,
                })
                .collect(),
        })
    }

    pub fn from_geometry(geometry: Geometry) -> Self {
        Self {
            images: vec![PathImage {
                geometry,
                energy: None,
            }],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &[PathImage] {
        &self.images
    }

    pub fn images_mut(&mut self) -> &mut [PathImage] {
        &mut self.images
    }

    pub fn first(&self) -> &Geometry {
        &self.images[0].geometry
    }

    pub fn last(&self) -> &Geometry {
        &self.images[self.images.len() - 1].geometry
    }

    /// Energies of all images, if every image has been evaluated.
    pub fn energies(&self) -> Option<Vec<f64>> {
        self.images.iter().map(|img| img.energy).collect()
    }

    /// Cumulative Cartesian arc length at each image.
    pub fn arc_lengths(&self) -> Vec<f64> {
        let mut total = 0.0;
        let mut lengths = Vec::with_capacity(self.images.len());
        for (k, image) in self.images.iter().enumerate() {
            if k > 0 {
                let prev = self.images[k - 1].geometry.to_flat();
                total += (image.geometry.to_flat() - prev).norm();
            }
            lengths.push(total);
        }
        lengths
    }

    /// Index of the highest-energy interior image.
    ///
    /// Returns `None` if energies are missing, the path has fewer than three
    /// images, or no interior image lies above both endpoints.
    pub fn peak_index(&self) -> Option<usize> {
        let energies = self.energies()?;
        let n = energies.len();
        if n < 3 {
            return None;
        }
        let (k, e_max) = energies[1..n - 1]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, e)| (k + 1, *e))?;
        (e_max > energies[0] && e_max > energies[n - 1]).then_some(k)
    }

    /// Unit central-difference tangent at an interior image.
    pub fn tangent_at(&self, index: usize) -> Option<DVector<f64>> {
        if index == 0 || index + 1 >= self.images.len() {
            return None;
        }
        let t = self.images[index + 1].geometry.to_flat() - self.images[index - 1].geometry.to_flat();
        let norm = t.norm();
        (norm > 1e-12).then(|| t / norm)
    }
}
