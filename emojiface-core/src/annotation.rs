//! The editable list of emoji placements.

use std::cmp::Ordering;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::assign::EmojiAssigner;
use crate::detection::Detection;
use crate::error::{OverlayError, ensure_diameter, ensure_finite};
use crate::geometry::{ScaleFactors, resolve_geometry};

/// One emoji drawn on the base image, in base-image pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub center_x: f32,
    pub center_y: f32,
    pub diameter: f32,
    /// Clockwise rotation on screen.
    pub angle_degrees: f32,
    pub symbol: String,
}

impl Placement {
    /// Build a validated placement.
    pub fn new(
        center_x: f32,
        center_y: f32,
        symbol: impl Into<String>,
        diameter: f32,
        angle_degrees: f32,
    ) -> Result<Self, OverlayError> {
        let placement = Self {
            center_x,
            center_y,
            diameter,
            angle_degrees,
            symbol: symbol.into(),
        };
        placement.validate()?;
        Ok(placement)
    }

    pub fn validate(&self) -> Result<(), OverlayError> {
        ensure_finite("center x", self.center_x)?;
        ensure_finite("center y", self.center_y)?;
        ensure_finite("angle", self.angle_degrees)?;
        ensure_diameter(self.diameter)?;
        if self.symbol.is_empty() {
            return Err(OverlayError::EmptySymbol);
        }
        Ok(())
    }
}

/// Result of [`AnnotationList::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    /// The placement at this index now carries the new values.
    Updated(usize),
    /// The empty symbol removed this placement; later indices shifted down by one.
    Removed(Placement),
}

/// Ordered placements; list order is draw order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationList {
    placements: Vec<Placement>,
}

impl AnnotationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from existing placements, validating each one.
    pub fn from_placements(placements: Vec<Placement>) -> Result<Self, OverlayError> {
        for placement in &placements {
            placement.validate()?;
        }
        Ok(Self { placements })
    }

    /// Turn a detection batch into placements.
    ///
    /// Detections are visited left to right (stable on ties), geometry is resolved
    /// for all of them first, then each receives the next symbol from `assigner`.
    pub fn from_detections<R: Rng + ?Sized>(
        detections: &[Detection],
        scale: ScaleFactors,
        assigner: &mut EmojiAssigner,
        rng: &mut R,
    ) -> Result<Self, OverlayError> {
        let mut ordered: Vec<&Detection> = detections.iter().collect();
        ordered.sort_by(|a, b| {
            a.center_x
                .partial_cmp(&b.center_x)
                .unwrap_or(Ordering::Equal)
        });

        let geometries = ordered
            .into_iter()
            .map(|detection| resolve_geometry(detection, scale))
            .collect::<Result<Vec<_>, _>>()?;

        let placements = geometries
            .into_iter()
            .map(|geo| Placement {
                center_x: geo.center_x,
                center_y: geo.center_y,
                diameter: geo.diameter,
                angle_degrees: geo.angle_degrees,
                symbol: assigner.next_symbol(&mut *rng),
            })
            .collect();
        Ok(Self { placements })
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Placement> {
        self.placements.get(index)
    }

    pub fn as_slice(&self) -> &[Placement] {
        &self.placements
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Placement> {
        self.placements.iter()
    }

    pub fn to_vec(&self) -> Vec<Placement> {
        self.placements.clone()
    }

    /// Edit the placement at `index`, keeping its center.
    ///
    /// An empty `symbol` removes the placement instead; diameter and angle are then ignored.
    pub fn update(
        &mut self,
        index: usize,
        symbol: &str,
        diameter: f32,
        angle_degrees: f32,
    ) -> Result<EditOutcome, OverlayError> {
        let len = self.placements.len();
        if index >= len {
            return Err(OverlayError::IndexOutOfRange { index, len });
        }
        if symbol.is_empty() {
            return Ok(EditOutcome::Removed(self.placements.remove(index)));
        }
        ensure_diameter(diameter)?;
        ensure_finite("angle", angle_degrees)?;

        let placement = &mut self.placements[index];
        placement.symbol = symbol.to_string();
        placement.diameter = diameter;
        placement.angle_degrees = angle_degrees;
        Ok(EditOutcome::Updated(index))
    }

    /// Append a placement and return its index.
    pub fn add(
        &mut self,
        center_x: f32,
        center_y: f32,
        symbol: &str,
        diameter: f32,
        angle_degrees: f32,
    ) -> Result<usize, OverlayError> {
        let placement = Placement::new(center_x, center_y, symbol, diameter, angle_degrees)?;
        self.placements.push(placement);
        Ok(self.placements.len() - 1)
    }

    pub fn clear(&mut self) {
        self.placements.clear();
    }
}

impl<'a> IntoIterator for &'a AnnotationList {
    type Item = &'a Placement;
    type IntoIter = std::slice::Iter<'a, Placement>;

    fn into_iter(self) -> Self::IntoIter {
        self.placements.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::DETECTION_WIDTH;
    use rand::{SeedableRng, rngs::StdRng};

    fn detection_at(cx: f32) -> Detection {
        let mut row = [0.0f32; DETECTION_WIDTH];
        row[..5].copy_from_slice(&[cx, 10.0, 20.0, 20.0, 0.9]);
        row[9] = 1.0;
        Detection::from_row(&row).unwrap()
    }

    fn sample_list() -> AnnotationList {
        AnnotationList::from_placements(vec![
            Placement::new(10.0, 10.0, "a", 20.0, 0.0).unwrap(),
            Placement::new(30.0, 10.0, "b", 20.0, 0.0).unwrap(),
            Placement::new(50.0, 10.0, "c", 20.0, 0.0).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn detections_are_ordered_left_to_right() {
        let detections = vec![detection_at(300.0), detection_at(100.0), detection_at(200.0)];
        let mut assigner = EmojiAssigner::new(["😂", "😎", "😆"]).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let list = AnnotationList::from_detections(
            &detections,
            ScaleFactors::new(2.0, 2.0),
            &mut assigner,
            &mut rng,
        )
        .unwrap();

        assert_eq!(list.len(), detections.len());
        let xs: Vec<f32> = list.iter().map(|p| p.center_x).collect();
        assert_eq!(xs, vec![200.0, 400.0, 600.0]);
        assert!(
            list.as_slice()
                .windows(2)
                .all(|pair| pair[0].symbol != pair[1].symbol)
        );
    }

    #[test]
    fn bad_detection_fails_whole_batch() {
        let mut bad = detection_at(50.0);
        bad.width = 0.0;
        bad.height = 0.0;
        let mut assigner = EmojiAssigner::new(["a", "b"]).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let result = AnnotationList::from_detections(
            &[detection_at(10.0), bad],
            ScaleFactors::IDENTITY,
            &mut assigner,
            &mut rng,
        );
        assert!(result.is_err());
        assert_eq!(assigner.remaining().len(), 2);
    }

    #[test]
    fn update_keeps_center() {
        let mut list = sample_list();
        let outcome = list.update(1, "z", 42.0, 15.0).unwrap();
        assert_eq!(outcome, EditOutcome::Updated(1));
        let p = list.get(1).unwrap();
        assert_eq!((p.center_x, p.center_y), (30.0, 10.0));
        assert_eq!(p.symbol, "z");
        assert_eq!(p.diameter, 42.0);
        assert_eq!(p.angle_degrees, 15.0);
    }

    #[test]
    fn empty_symbol_removes_and_shifts() {
        let mut list = sample_list();
        let outcome = list.update(0, "", 0.0, f32::NAN).unwrap();
        assert!(matches!(outcome, EditOutcome::Removed(ref p) if p.symbol == "a"));
        assert_eq!(list.len(), 2);
        assert_eq!(list.get(0).unwrap().symbol, "b");
        assert_eq!(list.get(1).unwrap().symbol, "c");
    }

    #[test]
    fn update_validates_inputs() {
        let mut list = sample_list();
        assert!(matches!(
            list.update(3, "x", 10.0, 0.0),
            Err(OverlayError::IndexOutOfRange { index: 3, len: 3 })
        ));
        assert!(matches!(
            list.update(0, "x", 0.0, 0.0),
            Err(OverlayError::InvalidDiameter(_))
        ));
        assert!(list.update(0, "x", 10.0, f32::INFINITY).is_err());
        assert_eq!(list, sample_list());
    }

    #[test]
    fn add_appends_and_validates() {
        let mut list = AnnotationList::new();
        assert_eq!(list.add(5.0, 6.0, "🤠", 30.0, -10.0).unwrap(), 0);
        assert_eq!(list.add(7.0, 8.0, "😋", 30.0, 0.0).unwrap(), 1);
        assert!(matches!(
            list.add(1.0, 1.0, "", 30.0, 0.0),
            Err(OverlayError::EmptySymbol)
        ));
        assert!(list.add(1.0, 1.0, "x", -3.0, 0.0).is_err());
        assert_eq!(list.len(), 2);
        list.clear();
        assert!(list.is_empty());
    }

    #[test]
    fn placements_serialize_as_plain_objects() {
        let p = Placement::new(1.5, 2.5, "😂", 10.0, 45.0).unwrap();
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["symbol"], "😂");
        assert_eq!(json["angle_degrees"], 45.0);
        let back: Placement = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }
}
