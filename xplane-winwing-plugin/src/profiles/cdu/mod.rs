//! CDU / MCDU aircraft profiles.
//!
//! A profile renders the aircraft's MCDU text datarefs into a [`CduPage`],
//! supplies the colour and glyph tables used to encode it, maps logical keys
//! to simulator commands, and reports backlight and annunciator levels.

mod md11;
mod toliss;

pub use md11::RotateMd11CduProfile;
pub use toliss::TolissCduProfile;

use winwing_protocol::cdu::{color, CduHardware, CduKey, CduLed, CduVariant};
use winwing_state::CduPage;

use crate::datarefs::DatarefStore;
pub(crate) use crate::profiles::Watch;
use crate::profiles::ProfileEntry;
use crate::xplm_shim::CommandPhase;

/// The attached unit, handed to profile constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CduUnit {
    pub hardware: CduHardware,
    pub variant:  CduVariant,
}

/// One simulator command reachable from one or more keys. Keys differ
/// between MCDU and PFP layouts, so most commands list one key of each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CduButton {
    pub keys:    Vec<CduKey>,
    pub command: String,
}

impl CduButton {
    pub fn new(keys: &[CduKey], command: impl Into<String>) -> Self {
        Self { keys: keys.to_vec(), command: command.into() }
    }
}

pub trait CduProfile: Send {
    fn name(&self) -> &'static str;

    /// Datarefs whose change triggers a page redraw.
    fn display_datarefs(&self) -> &[String];

    fn buttons(&self) -> &[CduButton];

    /// Wire colour for one of the page's colour codes.
    fn color(&self, code: u8) -> u16;

    /// Append the glyph bytes for `ch`.
    fn glyph(&self, ch: u8, small: bool, out: &mut Vec<u8>);

    fn update_page(&self, store: &DatarefStore, page: &mut CduPage);

    /// Register dataref monitors. Called once after construction.
    fn start(&mut self, store: &DatarefStore);

    fn stop(&mut self, store: &DatarefStore);

    /// LED levels, when something they depend on changed since the last call.
    fn take_leds(&mut self, store: &DatarefStore) -> Option<Vec<(CduLed, u8)>>;

    fn button_pressed(&mut self, store: &DatarefStore, button: &CduButton, phase: CommandPhase) {
        store.execute_command(&button.command, phase);
    }
}

pub fn registry() -> [ProfileEntry<dyn CduProfile, CduUnit>; 2] {
    [
        ProfileEntry { name: "ToLiss A3xx", eligible: TolissCduProfile::is_eligible, create: TolissCduProfile::boxed },
        ProfileEntry { name: "Rotate MD-11", eligible: RotateMd11CduProfile::is_eligible, create: RotateMd11CduProfile::boxed },
    ]
}

/// First button bound to `key`.
pub fn find_button(table: &[CduButton], key: CduKey) -> Option<&CduButton> {
    table.iter().find(|b| b.keys.contains(&key))
}

/// Colour codes shared by the Airbus style pages. Unknown codes draw white.
pub(crate) fn airbus_color(code: u8) -> u16 {
    match code {
        b'a' => color::AMBER,
        b'b' => color::CYAN,
        b'g' => color::GREEN,
        b'm' => color::MAGENTA,
        b'r' => color::RED,
        b'y' => color::YELLOW,
        b'e' => color::GREY,
        _ => color::WHITE,
    }
}
