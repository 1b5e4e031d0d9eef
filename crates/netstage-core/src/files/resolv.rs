//! `/etc/resolv.conf` model

use crate::model::payload::DnsConfig;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvConf {
    pub nameservers: Vec<String>,
    pub search: Vec<String>,
    /// `options`, `domain` and other lines, kept verbatim
    pub other: Vec<String>,
}

impl ResolvConf {
    pub fn parse(text: &str) -> Self {
        let mut conf = Self::default();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            let mut words = line.split_whitespace();
            match words.next() {
                Some("nameserver") => conf.nameservers.extend(words.map(str::to_string)),
                Some("search") => conf.search = words.map(str::to_string).collect(),
                _ => conf.other.push(line.to_string()),
            }
        }
        conf
    }

    /// Replace nameservers and search domains, keeping other directives
    pub fn apply(&mut self, dns: &DnsConfig) {
        self.nameservers = dns.nameservers.clone();
        self.search = dns.search_domains.clone();
    }

    pub fn render(&self) -> String {
        let mut out = String::from("# Generated by netstage\n");
        for ns in &self.nameservers {
            out.push_str(&format!("nameserver {}\n", ns));
        }
        if !self.search.is_empty() {
            out.push_str(&format!("search {}\n", self.search.join(" ")));
        }
        for line in &self.other {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_keeps_options() {
        let mut conf = ResolvConf::parse(
            "# managed elsewhere\nnameserver 10.0.0.1\nsearch lan\noptions edns0 trust-ad\n",
        );
        conf.apply(&DnsConfig {
            nameservers: vec!["1.1.1.1".into(), "9.9.9.9".into()],
            search_domains: vec!["example.org".into(), "lan".into()],
        });

        assert_eq!(
            conf.render(),
            "# Generated by netstage\nnameserver 1.1.1.1\nnameserver 9.9.9.9\nsearch example.org lan\noptions edns0 trust-ad\n"
        );
    }
}
