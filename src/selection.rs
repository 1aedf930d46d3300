//! Passpoint match ranking.
//!
//! Ranks how well a set of credentials matches an AP's advertised ANQP
//! content. Field order of [`MatchRank`] is the tie-break order:
//!
//! 1. home match beats roaming match
//! 2. advertised authentication equal to the credential's
//! 3. all required home OIs advertised in the Roaming Consortium element
//!
//! Exact ties go to the earliest candidate.

use crate::access_point::AccessPoint;
use crate::credentials::Credentials;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchKind {
    Roaming,
    Home,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MatchRank {
    pub kind: MatchKind,
    pub auth_match: bool,
    pub required_ois_advertised: bool,
}

/// How `creds` match `ap`, if at all.
///
/// Home: the AP domain is the FQDN or a partner FQDN, or the advertised OI
/// is a home OI. Roaming: the advertised OI is a roaming OI, or the AP lists
/// the credential realm among its NAI realms.
pub fn match_kind(creds: &Credentials, ap: &AccessPoint) -> Option<MatchKind> {
    let domain_home = ap.domain.as_deref().is_some_and(|d| creds.is_home_domain(d));
    let oi_home = ap
        .roaming_consortium
        .is_some_and(|oi| creds.home_ois.contains(&oi));
    if domain_home || oi_home {
        return Some(MatchKind::Home);
    }

    let oi_roaming = ap
        .roaming_consortium
        .is_some_and(|oi| creds.roaming_ois.contains(&oi));
    if oi_roaming || ap.advertises_realm(creds.realm()) {
        return Some(MatchKind::Roaming);
    }

    None
}

pub fn rank(creds: &Credentials, ap: &AccessPoint) -> Option<MatchRank> {
    let kind = match_kind(creds, ap)?;
    Some(MatchRank {
        kind,
        auth_match: ap.auth == creds.auth,
        required_ois_advertised: creds
            .required_home_ois
            .iter()
            .all(|oi| ap.roaming_consortium == Some(*oi)),
    })
}

/// Best rank of `ap` over every credential set.
pub fn best_rank(credentials: &[Credentials], ap: &AccessPoint) -> Option<MatchRank> {
    credentials.iter().filter_map(|c| rank(c, ap)).max()
}

/// Index of the AP the device should pick, or `None` if nothing matches.
pub fn select<'a, I>(credentials: &[Credentials], aps: I) -> Option<usize>
where
    I: IntoIterator<Item = &'a AccessPoint>,
{
    let mut best: Option<(usize, MatchRank)> = None;
    for (idx, ap) in aps.into_iter().enumerate() {
        let Some(r) = best_rank(credentials, ap) else {
            continue;
        };
        if best.is_none_or(|(_, b)| r > b) {
            best = Some((idx, r));
        }
    }
    best.map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Auth;

    const HOME_OI: u64 = 0xaa;
    const ROAMING_OI_1: u64 = 0xbb;
    const ROAMING_OI_2: u64 = 0xcc;

    fn ap(ssid: &str, domain: &str, oi: u64) -> AccessPoint {
        AccessPoint::new(ssid)
            .with_domain(domain)
            .with_realms(&[domain])
            .with_roaming_consortium(oi)
    }

    #[test]
    fn test_domain_is_home() {
        let creds = Credentials::new("blue.example");
        assert_eq!(
            match_kind(&creds, &ap("blue", "blue.example", HOME_OI)),
            Some(MatchKind::Home)
        );
    }

    #[test]
    fn test_partner_domain_is_home() {
        let creds = Credentials::new("blue.example").with_partners(&["green.example"]);
        assert_eq!(
            match_kind(&creds, &ap("green", "green.example", ROAMING_OI_1)),
            Some(MatchKind::Home)
        );
    }

    #[test]
    fn test_home_oi_is_home() {
        let creds = Credentials::new("blue.example").with_home_ois(&[HOME_OI]);
        assert_eq!(
            match_kind(&creds, &ap("green", "green.example", HOME_OI)),
            Some(MatchKind::Home)
        );
    }

    #[test]
    fn test_roaming_by_oi_and_realm() {
        let creds = Credentials::new("blue.example").with_roaming_ois(&[ROAMING_OI_1]);
        assert_eq!(
            match_kind(&creds, &ap("green", "green.example", ROAMING_OI_1)),
            Some(MatchKind::Roaming)
        );

        let realm_ap = AccessPoint::new("green")
            .with_domain("green.example")
            .with_realms(&["green.example", "blue.example"]);
        assert_eq!(
            match_kind(&Credentials::new("blue.example"), &realm_ap),
            Some(MatchKind::Roaming)
        );
    }

    #[test]
    fn test_no_match() {
        let creds = Credentials::new("red.example");
        assert_eq!(match_kind(&creds, &ap("blue", "blue.example", HOME_OI)), None);
        assert_eq!(select(&[creds], &[ap("blue", "blue.example", HOME_OI)]), None);
    }

    #[test]
    fn test_home_beats_roaming() {
        let creds = Credentials::new("blue.example")
            .with_home_ois(&[HOME_OI])
            .with_roaming_ois(&[ROAMING_OI_1]);
        let aps = [
            ap("green", "green.example", ROAMING_OI_1),
            ap("blue", "blue.example", HOME_OI),
        ];
        assert_eq!(select(&[creds], &aps), Some(1));
    }

    #[test]
    fn test_auth_breaks_tie() {
        let creds = Credentials::new("blue.example").with_auth(Auth::Ttls);
        let aps = [
            ap("tls", "blue.example", ROAMING_OI_2).with_auth(Auth::Tls),
            ap("ttls", "blue.example", ROAMING_OI_1),
        ];
        assert_eq!(select(&[creds], &aps), Some(1));
    }

    #[test]
    fn test_required_oi_breaks_tie() {
        let creds = Credentials::new("blue.example").with_required_home_ois(&[HOME_OI]);
        let aps = [
            AccessPoint::new("another-blue")
                .with_domain("blue.example")
                .with_realms(&["blue.example"]),
            ap("blue", "blue.example", HOME_OI),
        ];
        assert_eq!(select(&[creds], &aps), Some(1));
    }

    #[test]
    fn test_best_rank_over_credentials() {
        let blue = Credentials::new("blue.example").with_home_ois(&[HOME_OI]);
        let red = Credentials::new("red.example")
            .with_home_ois(&[ROAMING_OI_2])
            .with_roaming_ois(&[ROAMING_OI_1]);
        let aps = [
            ap("green", "green.example", ROAMING_OI_1),
            ap("blue", "blue.example", HOME_OI),
        ];
        assert_eq!(
            best_rank(&[blue.clone(), red.clone()], &aps[0]).map(|r| r.kind),
            Some(MatchKind::Roaming)
        );
        assert_eq!(select(&[red, blue], &aps), Some(1));
    }

    #[test]
    fn test_exact_tie_goes_to_first() {
        let creds = Credentials::new("blue.example");
        let aps = [
            ap("first", "blue.example", HOME_OI),
            ap("second", "blue.example", HOME_OI),
        ];
        assert_eq!(select(&[creds], &aps), Some(0));
    }
}
