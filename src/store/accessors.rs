//! Named accessors translating folder settings to and from records.
//!
//! Getters return `None` when nothing is stored or the stored value has an
//! unexpected type.  Directory-wide settings live under the filename `"."`.

use chrono::{DateTime, Utc};

use crate::fields::{
    codes, datetime_to_dutc, decode_icon_location, dutc_to_datetime, encode_icon_location, Background, Color,
    Column, IconArrangement, IconViewOptions, LabelColor, LabelPosition, SortBy, ViewStyle, WindowFrame,
    DIRECTORY,
};
use crate::record::{FourCC, Value};
use super::DsStore;

impl DsStore {
    // ── Typed primitives ─────────────────────────────────────────────────────

    pub fn bool_value(&self, filename: &str, code: FourCC) -> Option<bool> {
        match self.value(filename, code)? {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn set_bool_value(&mut self, filename: &str, code: FourCC, value: bool) {
        self.set_value(filename, code, Value::Bool(value));
    }

    pub fn long_value(&self, filename: &str, code: FourCC) -> Option<u32> {
        match self.value(filename, code)? {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn set_long_value(&mut self, filename: &str, code: FourCC, value: u32) {
        self.set_value(filename, code, Value::Long(value));
    }

    fn shor_value(&self, filename: &str, code: FourCC) -> Option<u16> {
        match self.value(filename, code)? {
            Value::Shor(v) => Some(*v),
            _ => None,
        }
    }

    fn ustr_value(&self, filename: &str, code: FourCC) -> Option<&str> {
        match self.value(filename, code)? {
            Value::Ustr(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn blob_value(&self, filename: &str, code: FourCC) -> Option<&[u8]> {
        match self.value(filename, code)? {
            Value::Blob(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    fn type_value(&self, filename: &str, code: FourCC) -> Option<FourCC> {
        match self.value(filename, code)? {
            Value::Type(t) => Some(*t),
            _ => None,
        }
    }

    /// `comp` under `preferred`, else under `legacy`.
    fn comp_with_fallback(&self, filename: &str, preferred: FourCC, legacy: FourCC) -> Option<u64> {
        [preferred, legacy].into_iter().find_map(|code| match self.value(filename, code)? {
            Value::Comp(v) => Some(*v),
            _ => None,
        })
    }

    /// Store under `preferred` and drop any stale `legacy` copy.
    fn set_with_fallback(&mut self, filename: &str, preferred: FourCC, legacy: FourCC, value: Value) {
        self.remove_entry(filename, legacy);
        self.set_value(filename, preferred, value);
    }

    // ── Icon positions ───────────────────────────────────────────────────────

    /// Stored (top-left origin) icon position of `filename`.
    pub fn icon_location(&self, filename: &str) -> Option<(u32, u32)> {
        decode_icon_location(self.blob_value(filename, codes::ILOC)?)
    }

    pub fn set_icon_location(&mut self, filename: &str, x: u32, y: u32) {
        self.set_value(filename, codes::ILOC, Value::Blob(encode_icon_location(x, y)));
    }

    // ── Background ───────────────────────────────────────────────────────────

    pub fn background(&self) -> Option<Background> {
        Background::decode(self.blob_value(DIRECTORY, codes::BKGD)?)
    }

    /// Any kind other than a picture drops the stale `pict` record.
    pub fn set_background(&mut self, background: Background) {
        if !matches!(background, Background::Picture { .. }) {
            self.remove_entry(DIRECTORY, codes::PICT);
        }
        self.set_value(DIRECTORY, codes::BKGD, Value::Blob(background.encode()));
    }

    pub fn background_color(&self) -> Option<Color> {
        match self.background()? {
            Background::Color(c) => Some(c),
            _ => None,
        }
    }

    pub fn set_background_color(&mut self, color: Color) {
        self.set_background(Background::Color(color));
    }

    pub fn background_image_path(&self) -> Option<&str> {
        self.ustr_value(DIRECTORY, codes::PICT)
    }

    /// Record a picture background.  The path goes in a `pict` record and
    /// `BKGD` is switched to the picture kind.
    pub fn set_background_image_path(&mut self, path: &str) {
        let value = Value::Ustr(path.to_owned());
        let pict_len = value.encoded_len() as u32;
        self.set_value(DIRECTORY, codes::PICT, value);
        self.set_background(Background::Picture { pict_len });
    }

    // ── View settings ────────────────────────────────────────────────────────

    pub fn view_style(&self) -> Option<ViewStyle> {
        ViewStyle::from_code(self.type_value(DIRECTORY, codes::VSTL)?)
    }

    pub fn set_view_style(&mut self, style: ViewStyle) {
        self.set_value(DIRECTORY, codes::VSTL, Value::Type(style.code()));
    }

    pub fn icon_view_options(&self) -> Option<IconViewOptions> {
        IconViewOptions::decode(self.blob_value(DIRECTORY, codes::ICVO)?)
    }

    pub fn set_icon_view_options(&mut self, options: IconViewOptions) {
        self.set_value(DIRECTORY, codes::ICVO, Value::Blob(options.encode()));
    }

    fn update_icon_view_options(&mut self, f: impl FnOnce(&mut IconViewOptions)) {
        let mut opts = self.icon_view_options().unwrap_or_default();
        f(&mut opts);
        self.set_icon_view_options(opts);
    }

    pub fn icon_size(&self) -> Option<u16> {
        self.icon_view_options().map(|o| o.icon_size)
    }

    pub fn set_icon_size(&mut self, size: u16) {
        self.update_icon_view_options(|o| o.icon_size = size);
    }

    pub fn icon_arrangement(&self) -> Option<IconArrangement> {
        self.icon_view_options().map(|o| o.arrangement)
    }

    pub fn set_icon_arrangement(&mut self, arrangement: IconArrangement) {
        self.update_icon_view_options(|o| o.arrangement = arrangement);
    }

    pub fn label_position(&self) -> Option<LabelPosition> {
        self.icon_view_options().map(|o| o.label_position)
    }

    pub fn set_label_position(&mut self, position: LabelPosition) {
        self.update_icon_view_options(|o| o.label_position = position);
    }

    pub fn grid_spacing(&self) -> Option<u32> {
        self.long_value(DIRECTORY, codes::GRID_SPACING)
    }

    pub fn set_grid_spacing(&mut self, spacing: u32) {
        self.set_long_value(DIRECTORY, codes::GRID_SPACING, spacing);
    }

    /// Icon view label text size in points.
    pub fn text_size(&self) -> Option<u16> {
        self.shor_value(DIRECTORY, codes::ICVT)
    }

    pub fn set_text_size(&mut self, size: u16) {
        self.set_value(DIRECTORY, codes::ICVT, Value::Shor(size));
    }

    pub fn list_text_size(&self) -> Option<u16> {
        self.shor_value(DIRECTORY, codes::LSVT)
    }

    pub fn set_list_text_size(&mut self, size: u16) {
        self.set_value(DIRECTORY, codes::LSVT, Value::Shor(size));
    }

    pub fn show_item_info(&self) -> Option<bool> {
        self.bool_value(DIRECTORY, codes::SHOW_ITEM_INFO)
    }

    pub fn set_show_item_info(&mut self, show: bool) {
        self.set_bool_value(DIRECTORY, codes::SHOW_ITEM_INFO, show);
    }

    pub fn show_icon_preview(&self) -> Option<bool> {
        self.bool_value(DIRECTORY, codes::SHOW_ICON_PREVIEW)
    }

    pub fn set_show_icon_preview(&mut self, show: bool) {
        self.set_bool_value(DIRECTORY, codes::SHOW_ICON_PREVIEW, show);
    }

    pub fn sort_by(&self) -> Option<SortBy> {
        SortBy::from_code(self.type_value(DIRECTORY, codes::SORT_BY)?)
    }

    pub fn set_sort_by(&mut self, sort: SortBy) {
        self.set_value(DIRECTORY, codes::SORT_BY, Value::Type(sort.code()));
    }

    // ── Window chrome ────────────────────────────────────────────────────────

    pub fn window_frame(&self) -> Option<WindowFrame> {
        WindowFrame::decode(self.blob_value(DIRECTORY, codes::FWI0)?)
    }

    pub fn set_window_frame(&mut self, frame: WindowFrame) {
        self.set_value(DIRECTORY, codes::FWI0, Value::Blob(frame.encode()));
    }

    pub fn sidebar_width(&self) -> Option<u32> {
        self.long_value(DIRECTORY, codes::FWSW)
    }

    pub fn set_sidebar_width(&mut self, width: u32) {
        self.set_long_value(DIRECTORY, codes::FWSW, width);
    }

    pub fn show_toolbar(&self) -> Option<bool> {
        self.bool_value(DIRECTORY, codes::SHOW_TOOLBAR)
    }

    pub fn set_show_toolbar(&mut self, show: bool) {
        self.set_bool_value(DIRECTORY, codes::SHOW_TOOLBAR, show);
    }

    pub fn show_sidebar(&self) -> Option<bool> {
        self.bool_value(DIRECTORY, codes::SHOW_SIDEBAR)
    }

    pub fn set_show_sidebar(&mut self, show: bool) {
        self.set_bool_value(DIRECTORY, codes::SHOW_SIDEBAR, show);
    }

    pub fn show_path_bar(&self) -> Option<bool> {
        self.bool_value(DIRECTORY, codes::SHOW_PATH_BAR)
    }

    pub fn set_show_path_bar(&mut self, show: bool) {
        self.set_bool_value(DIRECTORY, codes::SHOW_PATH_BAR, show);
    }

    pub fn show_status_bar(&self) -> Option<bool> {
        self.bool_value(DIRECTORY, codes::SHOW_STATUS_BAR)
    }

    pub fn set_show_status_bar(&mut self, show: bool) {
        self.set_bool_value(DIRECTORY, codes::SHOW_STATUS_BAR, show);
    }

    // ── Labels and columns ───────────────────────────────────────────────────

    pub fn label_color(&self, filename: &str) -> Option<LabelColor> {
        LabelColor::from_index(self.long_value(filename, codes::LCLR)?)
    }

    /// `LabelColor::None` removes the label.
    pub fn set_label_color(&mut self, filename: &str, color: LabelColor) {
        if color == LabelColor::None {
            self.remove_entry(filename, codes::LCLR);
        } else {
            self.set_long_value(filename, codes::LCLR, color.index());
        }
    }

    pub fn show_relative_dates(&self) -> Option<bool> {
        self.bool_value(DIRECTORY, codes::RELATIVE_DATES)
    }

    pub fn set_show_relative_dates(&mut self, show: bool) {
        self.set_bool_value(DIRECTORY, codes::RELATIVE_DATES, show);
    }

    pub fn column_width(&self, column: Column) -> Option<u32> {
        self.long_value(DIRECTORY, column.width_code())
    }

    pub fn set_column_width(&mut self, column: Column, width: u32) {
        self.set_long_value(DIRECTORY, column.width_code(), width);
    }

    /// Falls back to the column's default visibility.
    pub fn column_visible(&self, column: Column) -> bool {
        self.bool_value(DIRECTORY, column.visible_code())
            .unwrap_or_else(|| column.visible_by_default())
    }

    pub fn set_column_visible(&mut self, column: Column, visible: bool) {
        self.set_bool_value(DIRECTORY, column.visible_code(), visible);
    }

    pub fn visible_columns(&self) -> Vec<Column> {
        Column::ALL.iter().copied().filter(|c| self.column_visible(*c)).collect()
    }

    /// Show exactly `columns`; every other column is hidden.
    pub fn set_visible_columns(&mut self, columns: &[Column]) {
        for column in Column::ALL {
            self.set_column_visible(column, columns.contains(&column));
        }
    }

    // ── Per-file metadata ────────────────────────────────────────────────────

    pub fn comments(&self, filename: &str) -> Option<&str> {
        self.ustr_value(filename, codes::CMMT)
    }

    pub fn set_comments(&mut self, filename: &str, comments: &str) {
        self.set_value(filename, codes::CMMT, Value::Ustr(comments.to_owned()));
    }

    pub fn logical_size(&self, filename: &str) -> Option<u64> {
        self.comp_with_fallback(filename, codes::LG1S, codes::LOGS)
    }

    pub fn set_logical_size(&mut self, filename: &str, size: u64) {
        self.set_with_fallback(filename, codes::LG1S, codes::LOGS, Value::Comp(size));
    }

    pub fn physical_size(&self, filename: &str) -> Option<u64> {
        self.comp_with_fallback(filename, codes::PH1S, codes::PHYS)
    }

    pub fn set_physical_size(&mut self, filename: &str, size: u64) {
        self.set_with_fallback(filename, codes::PH1S, codes::PHYS, Value::Comp(size));
    }

    pub fn modification_date(&self, filename: &str) -> Option<DateTime<Utc>> {
        [codes::MODD, codes::MODD_LEGACY]
            .into_iter()
            .find_map(|code| match self.value(filename, code)? {
                Value::Dutc(t) => Some(*t),
                _ => None,
            })
            .and_then(dutc_to_datetime)
    }

    pub fn set_modification_date(&mut self, filename: &str, date: &DateTime<Utc>) {
        self.set_with_fallback(filename, codes::MODD, codes::MODD_LEGACY, Value::Dutc(datetime_to_dutc(date)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use chrono::TimeZone;

    fn store() -> DsStore {
        DsStore::new("unused")
    }

    #[test]
    fn icon_size_edits_preserve_other_icvo_fields() {
        let mut s = store();
        s.set_icon_arrangement(IconArrangement::Grid);
        s.set_icon_size(96);
        s.set_label_position(LabelPosition::Right);
        let opts = s.icon_view_options().unwrap();
        assert_eq!(opts.icon_size, 96);
        assert_eq!(opts.arrangement, IconArrangement::Grid);
        assert_eq!(opts.label_position, LabelPosition::Right);
        assert_eq!(s.records().len(), 1);
    }

    #[test]
    fn legacy_size_code_is_read_and_replaced() {
        let mut s = store();
        s.set_entry(Record::new("f", codes::LOGS, Value::Comp(10)));
        assert_eq!(s.logical_size("f"), Some(10));

        s.set_logical_size("f", 20);
        assert_eq!(s.logical_size("f"), Some(20));
        assert!(s.entry("f", codes::LOGS).is_none());
        assert!(s.entry("f", codes::LG1S).is_some());
    }

    #[test]
    fn preferred_code_wins_over_legacy() {
        let mut s = store();
        s.set_entry(Record::new("f", codes::PHYS, Value::Comp(1)));
        s.set_entry(Record::new("f", codes::PH1S, Value::Comp(2)));
        assert_eq!(s.physical_size("f"), Some(2));
    }

    #[test]
    fn wrong_value_type_reads_as_absent() {
        let mut s = store();
        s.set_entry(Record::new("f", codes::CMMT, Value::Long(3)));
        assert_eq!(s.comments("f"), None);
    }

    #[test]
    fn background_image_switches_background_kind() {
        let mut s = store();
        s.set_background_color(Color::rgb(0.0, 0.0, 1.0));
        assert!(s.background_color().is_some());
        s.set_background_image_path("/usr/share/backgrounds/a.png");
        assert_eq!(s.background_image_path(), Some("/usr/share/backgrounds/a.png"));
        assert!(s.background_color().is_none());
        assert!(matches!(s.background(), Some(Background::Picture { .. })));

        s.set_background_color(Color::rgb(0.0, 1.0, 0.0));
        assert_eq!(s.background_image_path(), None);
        assert!(s.entry(DIRECTORY, codes::PICT).is_none());
        s.set_background(Background::Default);
        assert_eq!(s.records().len(), 1);
    }

    #[test]
    fn label_none_removes_record() {
        let mut s = store();
        s.set_label_color("f", LabelColor::Green);
        assert_eq!(s.label_color("f"), Some(LabelColor::Green));
        s.set_label_color("f", LabelColor::None);
        assert_eq!(s.label_color("f"), None);
        assert!(s.records().is_empty());
    }

    #[test]
    fn visible_columns_defaults_and_overrides() {
        let mut s = store();
        assert_eq!(s.visible_columns(), [Column::Name, Column::DateModified, Column::Size, Column::Kind]);
        s.set_visible_columns(&[Column::Name, Column::Comments]);
        assert_eq!(s.visible_columns(), [Column::Name, Column::Comments]);
        s.set_column_width(Column::Comments, 240);
        assert_eq!(s.column_width(Column::Comments), Some(240));
        assert_eq!(s.column_width(Column::Name), None);
    }

    #[test]
    fn modification_date_prefers_new_code() {
        let mut s = store();
        let old = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2020, 6, 1, 8, 0, 0).unwrap();
        s.set_entry(Record::new("f", codes::MODD_LEGACY, Value::Dutc(datetime_to_dutc(&old))));
        assert_eq!(s.modification_date("f"), Some(old));
        s.set_modification_date("f", &new);
        assert_eq!(s.modification_date("f"), Some(new));
    }

    #[test]
    fn directory_settings_use_dot_filename() {
        let mut s = store();
        s.set_view_style(ViewStyle::Column);
        s.set_sort_by(SortBy::Kind);
        s.set_show_toolbar(false);
        s.set_sidebar_width(180);
        assert_eq!(s.all_filenames(), ["."]);
        assert_eq!(s.view_style(), Some(ViewStyle::Column));
        assert_eq!(s.sort_by(), Some(SortBy::Kind));
        assert_eq!(s.show_toolbar(), Some(false));
        assert_eq!(s.show_sidebar(), None);
        assert_eq!(s.sidebar_width(), Some(180));
    }
}
