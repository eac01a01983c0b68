use dicom_core::Tag;
use dicom_object::DefaultDicomObject;

/// Small helper trait to pull typed header values out of a DICOM object.
///
/// Every accessor returns `None` when the element is absent or cannot be parsed,
/// so callers decide which attributes are mandatory.
pub trait ElementAccess {
    fn element_str(&self, tag: Tag) -> Option<String>;
    fn element_f64(&self, tag: Tag) -> Option<f64>;
    fn element_multi_f64(&self, tag: Tag) -> Option<Vec<f64>>;
    fn element_u32(&self, tag: Tag) -> Option<u32>;
}

impl ElementAccess for DefaultDicomObject {
    fn element_str(&self, tag: Tag) -> Option<String> {
        self.element(tag)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|s| s.trim().to_string())
    }

    fn element_f64(&self, tag: Tag) -> Option<f64> {
        self.element(tag).ok().and_then(|e| e.to_float64().ok())
    }

    fn element_multi_f64(&self, tag: Tag) -> Option<Vec<f64>> {
        self.element(tag)
            .ok()
            .and_then(|e| e.to_multi_float64().ok())
    }

    fn element_u32(&self, tag: Tag) -> Option<u32> {
        self.element(tag).ok().and_then(|e| e.to_int::<u32>().ok())
    }
}

/// Fixed-length variant of [`ElementAccess::element_multi_f64`].
pub fn element_array<const N: usize, T: ElementAccess>(obj: &T, tag: Tag) -> Option<[f64; N]> {
    let values = obj.element_multi_f64(tag)?;
    values.try_into().ok()
}
