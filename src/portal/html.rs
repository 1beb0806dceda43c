use crate::config::PortalOptions;
use crate::dynamic::DynamicFields;
use crate::portal::FixedField;
use crate::record::ConfigRecord;
use alloc::string::String;
use core::fmt::Write;
use strum::IntoEnumIterator;

const DEFAULT_STYLE: &str = "<style>div,input{padding:5px;font-size:1em;}input{width:95%;}\
body{text-align:center;}button{background-color:#16A1E7;color:#fff;line-height:2.4rem;\
font-size:1.2rem;width:100%;}fieldset{border-radius:0.3rem;margin:0px;}</style>";

const BODY_START: &str =
    "</head><div style=\"text-align:left;display:inline-block;min-width:260px;\">";

const SCRIPT_START: &str = "<script>function udVal(key,val){var request=new XMLHttpRequest();\
var url='/?key='+key+'&value='+encodeURIComponent(val);request.open('GET',url,false);\
request.send(null);}function sv(){";

const SCRIPT_END: &str = "alert('Updated');}</script>";

/// Escapes text for use in element content and double quoted attribute values.
pub fn escape_html(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
}

fn fixed_value<'r>(record: &'r ConfigRecord, field: FixedField, port: &'r mut String) -> &'r str {
    match field {
        FixedField::WifiSsid0 => record.wifi[0].ssid.as_str(),
        FixedField::WifiPassword0 => record.wifi[0].password.as_str(),
        FixedField::WifiSsid1 => record.wifi[1].ssid.as_str(),
        FixedField::WifiPassword1 => record.wifi[1].password.as_str(),
        FixedField::Server0 => record.cloud[0].server.as_str(),
        FixedField::Token0 => record.cloud[0].token.as_str(),
        FixedField::Server1 => record.cloud[1].server.as_str(),
        FixedField::Token1 => record.cloud[1].token.as_str(),
        FixedField::Port => {
            port.clear();
            let _ = write!(port, "{}", record.port);
            port.as_str()
        }
        FixedField::BoardName => record.board_name.as_str(),
    }
}

fn input(out: &mut String, label: &str, id: &str, value: &str) {
    out.push_str("<div><label>");
    escape_html(out, label);
    out.push_str("</label><input value=\"");
    escape_html(out, value);
    out.push_str("\" id=\"");
    escape_html(out, id);
    out.push_str("\"><div></div></div>");
}

fn script_item(out: &mut String, id: &str) {
    let _ = write!(out, "udVal('{id}',document.getElementById('{id}').value);");
}

/// Renders the config form with the current values of `record` and `fields`.
pub fn render_page(
    title: &str,
    record: &ConfigRecord,
    fields: &DynamicFields<'_>,
    options: &PortalOptions,
) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str("<!DOCTYPE html><html><head><title>");
    escape_html(&mut out, title);
    out.push_str("</title>");
    out.push_str(options.custom_style.as_deref().unwrap_or(DEFAULT_STYLE));
    if let Some(head) = &options.custom_head {
        out.push_str(head);
    }
    out.push_str(BODY_START);

    let mut port = String::new();
    let mut group = None;
    for field in FixedField::iter() {
        if group != Some(field.group()) {
            if group.is_some() {
                out.push_str("</fieldset>");
            }
            out.push_str("<fieldset>");
            group = Some(field.group());
        }
        let value = fixed_value(record, field, &mut port);
        input(&mut out, field.label(), field.into(), value);
    }
    out.push_str("</fieldset>");

    if !fields.is_empty() {
        out.push_str("<fieldset>");
        for field in fields.iter() {
            input(&mut out, field.label(), field.id(), field.value());
        }
        out.push_str("</fieldset>");
    }

    out.push_str("<button onclick=\"sv()\">Save</button></div>");

    out.push_str(SCRIPT_START);
    for field in FixedField::iter() {
        script_item(&mut out, field.into());
    }
    for field in fields.iter() {
        script_item(&mut out, field.id());
    }
    out.push_str(SCRIPT_END);
    out.push_str("</html>");
    out
}
