//! Keyword and pattern scan of VBA source code.

use regex::Regex;
use serde::Serialize;

pub const HEX_STRINGS: &str = "Hex Strings";
pub const BASE64_STRINGS: &str = "Base64 Strings";

const AUTOEXEC: &[(&str, &[&str])] = &[
    ("Runs when the Word document is opened", &["AutoExec", "AutoOpen", "DocumentOpen"]),
    (
        "Runs when the Word document is closed",
        &["AutoExit", "AutoClose", "Document_Close", "DocumentBeforeClose"],
    ),
    ("Runs when the Word document is modified", &["DocumentChange"]),
    ("Runs when a new Word document is created", &["AutoNew", "Document_New", "NewDocument"]),
    ("Runs when the Word or Publisher document is opened", &["Document_Open"]),
    ("Runs when the Publisher document is closed", &["Document_BeforeClose"]),
    ("Runs when the Excel Workbook is opened", &["Auto_Open", "Workbook_Open", "Workbook_Activate"]),
    ("Runs when the Excel Workbook is closed", &["Auto_Close", "Workbook_Close"]),
];

const SUSPICIOUS: &[(&str, &[&str])] = &[
    ("May read system environment variables", &["Environ"]),
    ("May open a file", &["Open"]),
    ("May write to a file (if combined with Open)", &["Write", "Put", "Output", "Print #"]),
    ("May read or write a binary file (if combined with Open)", &["Binary"]),
    ("May copy a file", &["FileCopy", "CopyFile"]),
    ("May delete a file", &["Kill"]),
    ("May create a text file", &["CreateTextFile", "ADODB.Stream", "WriteText", "SaveToFile"]),
    (
        "May run an executable file or a system command",
        &[
            "Shell",
            "vbNormal",
            "vbNormalFocus",
            "vbHide",
            "vbMinimizedFocus",
            "vbMaximizedFocus",
            "vbNormalNoFocus",
            "vbMinimizedNoFocus",
            "WScript.Shell",
            "Run",
            "ShellExecute",
        ],
    ),
    (
        "May run PowerShell commands",
        &[
            "PowerShell",
            "noexit",
            "ExecutionPolicy",
            "noprofile",
            "command",
            "EncodedCommand",
            "invoke-command",
            "scriptblock",
            "Invoke-Expression",
            "AuthorizationManager",
        ],
    ),
    ("May run an executable file or a system command using PowerShell", &["Start-Process"]),
    ("May hide the application", &["Application.Visible", "ShowWindow", "SW_HIDE"]),
    ("May create a directory", &["MkDir"]),
    ("May save the current workbook", &["ActiveWorkbook.SaveAs"]),
    (
        "May change which directory contains files to open at startup",
        &["Application.AltStartupPath"],
    ),
    ("May create an OLE object", &["CreateObject"]),
    ("May create an OLE object using PowerShell", &["New-Object"]),
    ("May run an application (if combined with CreateObject)", &["Shell.Application"]),
    (
        "May enumerate application windows (if combined with Shell.Application object)",
        &["Windows", "FindWindow"],
    ),
    ("May run code from a DLL", &["Lib"]),
    (
        "May inject code into another process",
        &[
            "CreateThread",
            "VirtualAlloc",
            "VirtualAllocEx",
            "RtlMoveMemory",
            "WriteProcessMemory",
            "SetContextThread",
            "QueueApcThread",
            "WriteVirtualMemory",
            "VirtualProtect",
        ],
    ),
    (
        "May download files from the Internet",
        &[
            "URLDownloadToFileA",
            "Msxml2.XMLHTTP",
            "Microsoft.XMLHTTP",
            "MSXML2.ServerXMLHTTP",
            "User-Agent",
        ],
    ),
    (
        "May download files from the Internet using PowerShell",
        &["Net.WebClient", "DownloadFile", "DownloadString"],
    ),
    (
        "May control another application by simulating user keystrokes",
        &["SendKeys", "AppActivate"],
    ),
    ("May attempt to obfuscate malicious function calls", &["CallByName"]),
    (
        "May attempt to obfuscate specific strings",
        &["Chr", "ChrB", "ChrW", "StrReverse", "Xor"],
    ),
    ("May read or write registry keys", &["RegOpenKeyExA", "RegOpenKeyEx", "RegCloseKey"]),
    ("May read registry keys", &["RegQueryValueExA", "RegQueryValueEx", "RegRead"]),
    (
        "May detect virtualization",
        &[r"SYSTEM\ControlSet001\Services\Disk\Enum", "VIRTUAL", "VMWARE", "VBOX"],
    ),
    ("May detect WinJail Sandbox", &["Afx:400000:0"]),
];

const IOC_PATTERNS: &[(&str, &str)] = &[
    ("URL", r"(?i)\b(?:https?|ftp)://[a-z0-9\-.]+(?::[0-9]+)?(?:/[a-z0-9\-._?,'/\\+&%$#=~]*)?"),
    ("IPv4 address", r"\b(?:\d{1,3}\.){3}\d{1,3}\b"),
    (
        "Executable file name",
        r"(?i)\b\w+\.(?:exe|pif|gadget|msi|msp|msc|vbs|vbe|vb|jse|js|wsf|wsc|wsh|ws|bat|cmd|dll|scr|hta|cpl|class|jar|ps1xml|ps1|ps2xml|ps2|psc1|psc2|scf|lnk|inf|reg)\b",
    ),
];

const HEX_PATTERN: &str = r"(?:[0-9A-Fa-f]{2}){4,}";
const BASE64_PATTERN: &str =
    r#""((?:[A-Za-z0-9+/]{4})+(?:[A-Za-z0-9+/]{2}[AEIMQUYcgkosw048]=|[A-Za-z0-9+/][AQgw]==)?)""#;
const BASE64_WHITELIST: [&str; 10] = [
    "thisdocument",
    "thisworkbook",
    "test",
    "temp",
    "http",
    "open",
    "exit",
    "kernel32",
    "virtualalloc",
    "createthread",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Category {
    AutoExec,
    Suspicious,
    #[serde(rename = "IOC")]
    Ioc,
}

/// One finding in a module's source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub category: Category,
    pub keyword: String,
    pub description: String,
}

impl Finding {
    fn new(category: Category, keyword: &str, description: &str) -> Self {
        Self {
            category,
            keyword: keyword.to_string(),
            description: description.to_string(),
        }
    }
}

/// Keywords made only of word characters must match whole words.
fn keyword_pattern(keyword: &str) -> Option<Regex> {
    let escaped = regex::escape(keyword);
    let pattern = if keyword.chars().all(|c| c.is_alphanumeric() || c == '_') {
        format!(r"(?i)\b{}\b", escaped)
    } else {
        format!("(?i){}", escaped)
    };
    Regex::new(&pattern).ok()
}

fn scan_keywords(code: &str, category: Category, table: &[(&str, &[&str])], findings: &mut Vec<Finding>) {
    for (description, keywords) in table {
        for keyword in keywords.iter() {
            if keyword_pattern(keyword).is_some_and(|re| re.is_match(code)) {
                findings.push(Finding::new(category, keyword, description));
            }
        }
    }
}

fn valid_ipv4(candidate: &str) -> bool {
    candidate.parse::<std::net::Ipv4Addr>().is_ok()
}

fn scan_iocs(code: &str, findings: &mut Vec<Finding>) {
    for (description, pattern) in IOC_PATTERNS {
        let Ok(re) = Regex::new(pattern) else {
            continue;
        };
        let mut seen: Vec<&str> = Vec::new();
        for found in re.find_iter(code).map(|m| m.as_str()) {
            if *description == "IPv4 address" && !valid_ipv4(found) {
                continue;
            }
            if !seen.contains(&found) {
                seen.push(found);
                findings.push(Finding::new(Category::Ioc, found, description));
            }
        }
    }
}

pub fn has_hex_strings(code: &str) -> bool {
    Regex::new(HEX_PATTERN).is_ok_and(|re| re.is_match(code))
}

/// Quoted base64 literals that contain at least one non-hex letter.
pub fn base64_strings(code: &str) -> Vec<String> {
    let Ok(re) = Regex::new(BASE64_PATTERN) else {
        return Vec::new();
    };
    let mut found: Vec<String> = Vec::new();
    for captures in re.captures_iter(code) {
        let value = &captures[1];
        let not_hex = value.chars().any(|c| matches!(c, 'G'..='Z' | 'g'..='z'));
        if not_hex && !BASE64_WHITELIST.contains(&value.to_lowercase().as_str()) && !found.iter().any(|v| v == value) {
            found.push(value.to_string());
        }
    }
    found
}

/// Scan one module. Findings come out grouped: AutoExec, Suspicious, IOC,
/// then the encoded-string summaries.
pub fn scan(code: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    scan_keywords(code, Category::AutoExec, AUTOEXEC, &mut findings);
    scan_keywords(code, Category::Suspicious, SUSPICIOUS, &mut findings);
    scan_iocs(code, &mut findings);

    if has_hex_strings(code) {
        findings.push(Finding::new(
            Category::Suspicious,
            HEX_STRINGS,
            "Hex-encoded strings were detected, may be used to obfuscate strings",
        ));
    }
    if !base64_strings(code).is_empty() {
        findings.push(Finding::new(
            Category::Suspicious,
            BASE64_STRINGS,
            "Base64-encoded strings were detected, may be used to obfuscate strings",
        ));
    }
    findings
}
