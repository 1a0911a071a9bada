use crate::plugin::{FormatCodec, FormatFamily};

pub(super) fn families() -> Vec<FormatFamily> {
    vec![
        FormatFamily::new("number")
            .with_format(native("Number", "number", "number", "is_number({})"))
            .with_format(json_text("Number", "number", "json", "is_number({})")),
        FormatFamily::new("string")
            .with_format(native("String", "string", "text", "is_string({})"))
            .with_format(json_text("String", "string", "json", "is_string({})")),
        FormatFamily::new("boolean")
            .with_format(native("Boolean", "boolean", "boolean", "is_bool({})"))
            .with_format(json_text("Boolean", "boolean", "json", "is_bool({})")),
        FormatFamily::new("geo")
            .with_format(native("Geo", "geo", "GeoJSON", "has_key({}, 'type')"))
            .with_format(json_text("Geo", "geo", "GeoJSON text", "has_key({}, 'type')")),
    ]
}

/// The data is held as is. `check` is a predicate with `{}` standing for
/// the data.
fn native(wrapper: &str, kind: &str, format: &str, check: &str) -> FormatCodec {
    let data = format!("{wrapper}(data, format='{format}')");
    FormatCodec::new(format, format!("valid = Output({}, type='boolean')", check.replace("{}", &data)))
        .with_reader(format!("data = {wrapper}(input, format='{format}')"))
        .with_writer(format!("output = Output(data, type='{kind}', format='{format}')"))
}

/// The data is held as JSON text.
fn json_text(wrapper: &str, kind: &str, format: &str, check: &str) -> FormatCodec {
    let validator = format!(
        "valid = Output(is_json({wrapper}(data, format='{format}')) and {}, type='boolean')",
        check.replace("{}", "loads(data)")
    );
    FormatCodec::new(format, validator)
        .with_reader(format!("data = loads({wrapper}(input, format='{format}'))"))
        .with_writer(format!("output = Output(dumps(data), type='{kind}', format='{format}')"))
}
