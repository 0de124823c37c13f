//! Regional endpoint helpers
//!
//! CORTX has no notion of AWS regions or hosted zones, but the bucket
//! attributes are reported in their AWS-compatible form so that existing
//! configuration referencing them keeps working.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Route 53 hosted zone ids of the S3 website endpoints, per region
static HOSTED_ZONE_IDS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("af-south-1", "Z83WF9RJE8B12"),
        ("ap-east-1", "ZNB98KWMFR0R6"),
        ("ap-northeast-1", "Z2M4EHUR26P7ZW"),
        ("ap-northeast-2", "Z3W03O7B5YMIYP"),
        ("ap-northeast-3", "Z2YQB5RD63NC85"),
        ("ap-south-1", "Z11RGJOFQNVJUP"),
        ("ap-southeast-1", "Z3O0J2DXBE1FTB"),
        ("ap-southeast-2", "Z1WCIGYICN2BYD"),
        ("ap-southeast-3", "Z01613992JD795ZI93075"),
        ("ca-central-1", "Z1QDHH18159H29"),
        ("cn-northwest-1", "Z282HJ1KT0DH03"),
        ("eu-central-1", "Z21DNDUVLTQW6Q"),
        ("eu-north-1", "Z3BAZG2TWCNX0D"),
        ("eu-south-1", "Z30OZKI7KPW7MI"),
        ("eu-west-1", "Z1BKCTXD74EZPE"),
        ("eu-west-2", "Z3GKZC51ZF0DB4"),
        ("eu-west-3", "Z3R1K369G5AVDG"),
        ("me-south-1", "Z1MPMWCPA7YB62"),
        ("sa-east-1", "Z7KQH4QJS55SO"),
        ("us-east-1", "Z3AQBSTGFYJSTF"),
        ("us-east-2", "Z2O1EMRO9K5GLX"),
        ("us-gov-east-1", "Z2NIFVYYW2VKV1"),
        ("us-gov-west-1", "Z31GFT0UA1I2HV"),
        ("us-west-1", "Z2F56UZL2M1ACD"),
        ("us-west-2", "Z3BJ6K6RIION7M"),
    ])
});

/// Hosted zone id for a region, if the region is known
pub fn hosted_zone_id(region: &str) -> Option<&'static str> {
    HOSTED_ZONE_IDS.get(region).copied()
}

fn dns_suffix(region: &str) -> &'static str {
    if region.starts_with("cn-") {
        "amazonaws.com.cn"
    } else {
        "amazonaws.com"
    }
}

/// Synthetic ARN of a bucket
pub fn bucket_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{}", bucket)
}

/// Global (non-regional) domain name of a bucket
pub fn bucket_domain_name(bucket: &str) -> String {
    format!("{}.s3.amazonaws.com", bucket)
}

/// Regional domain name of a bucket
///
/// Falls back to the global name when no region is known.
pub fn bucket_regional_domain_name(bucket: &str, region: &str) -> String {
    if region.is_empty() {
        return bucket_domain_name(bucket);
    }
    format!("{}.s3.{}.{}", bucket, region, dns_suffix(region))
}

/// Static website domain of a region
pub fn website_domain(region: &str) -> String {
    format!("s3-website.{}.amazonaws.com", region)
}

/// Static website endpoint of a bucket
pub fn website_endpoint(bucket: &str, region: &str) -> String {
    format!("{}.{}", bucket, website_domain(region))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosted_zone_lookup() {
        assert_eq!(hosted_zone_id("us-east-1"), Some("Z3AQBSTGFYJSTF"));
        assert_eq!(hosted_zone_id("ap-southeast-3"), Some("Z01613992JD795ZI93075"));
        assert_eq!(hosted_zone_id("cortx-local"), None);
        assert_eq!(HOSTED_ZONE_IDS.len(), 25);
    }

    #[test]
    fn regional_domain_name() {
        assert_eq!(bucket_regional_domain_name("logs", ""), "logs.s3.amazonaws.com");
        assert_eq!(
            bucket_regional_domain_name("logs", "eu-west-1"),
            "logs.s3.eu-west-1.amazonaws.com"
        );
        assert_eq!(
            bucket_regional_domain_name("logs", "cn-northwest-1"),
            "logs.s3.cn-northwest-1.amazonaws.com.cn"
        );
    }

    #[test]
    fn website_names() {
        assert_eq!(website_domain("us-east-1"), "s3-website.us-east-1.amazonaws.com");
        assert_eq!(
            website_endpoint("site", "us-east-1"),
            "site.s3-website.us-east-1.amazonaws.com"
        );
        assert_eq!(bucket_arn("site"), "arn:aws:s3:::site");
    }
}
