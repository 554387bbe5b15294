/// Source-prefixed patient identifier (unique across sources).
/// Examples: `chexpert_patient64541`, `radiopaedia_1234`, `nih_unknown_ba7816bf8f01cfea`
pub type PatientId = String;
/// Raw source tag as written in the master index.
/// Examples: `CheXpert`, `Radiopaedia`, `MIMIC-CXR`
pub type SourceName = String;
/// Image filename as listed in the master index.
/// Example: `chexpert_patient64541_study1_view1_frontal.jpg`
pub type Filename = String;
/// Path string as written in the master index (often relative to a dataset root).
/// Example: `captions/radiopaedia_1234_1.txt`
pub type PathString = String;
/// One raw master index cell.
pub type Cell = String;
