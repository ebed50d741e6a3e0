//! Kentucky geography tables used by the classifier.

/// Literal terms that mark an article as Kentucky-related on their own.
pub const KY_TERMS: &[&str] = &["Kentucky", "KY"];

pub const KY_STATE_CODE: &str = "KY";

/// All 120 Kentucky counties.
pub const KY_COUNTIES: &[&str] = &[
    "Adair", "Allen", "Anderson", "Ballard", "Barren", "Bath", "Bell", "Boone", "Bourbon",
    "Boyd", "Boyle", "Bracken", "Breathitt", "Breckinridge", "Bullitt", "Butler", "Caldwell",
    "Calloway", "Campbell", "Carlisle", "Carroll", "Carter", "Casey", "Christian", "Clark",
    "Clay", "Clinton", "Crittenden", "Cumberland", "Daviess", "Edmonson", "Elliott", "Estill",
    "Fayette", "Fleming", "Floyd", "Franklin", "Fulton", "Gallatin", "Garrard", "Grant",
    "Graves", "Grayson", "Green", "Greenup", "Hancock", "Hardin", "Harlan", "Harrison",
    "Hart", "Henderson", "Henry", "Hickman", "Hopkins", "Jackson", "Jefferson", "Jessamine",
    "Johnson", "Kenton", "Knott", "Knox", "Larue", "Laurel", "Lawrence", "Lee", "Leslie",
    "Letcher", "Lewis", "Lincoln", "Livingston", "Logan", "Lyon", "Madison", "Magoffin",
    "Marion", "Marshall", "Martin", "Mason", "McCracken", "McCreary", "McLean", "Meade",
    "Menifee", "Mercer", "Metcalfe", "Monroe", "Montgomery", "Morgan", "Muhlenberg", "Nelson",
    "Nicholas", "Ohio", "Oldham", "Owen", "Owsley", "Pendleton", "Perry", "Pike", "Powell",
    "Pulaski", "Robertson", "Rockcastle", "Rowan", "Russell", "Scott", "Shelby", "Simpson",
    "Spencer", "Taylor", "Todd", "Trigg", "Trimble", "Union", "Warren", "Washington",
    "Wayne", "Webster", "Whitley", "Wolfe", "Woodford",
];

/// Kentucky cities mapped to their counties. City mentions only count as
/// county evidence when the article carries a KY signal.
pub const KY_CITY_TO_COUNTY: &[(&str, &str)] = &[
    ("Louisville", "Jefferson"),
    ("Lexington", "Fayette"),
    ("Bowling Green", "Warren"),
    ("Owensboro", "Daviess"),
    ("Covington", "Kenton"),
    ("Richmond", "Madison"),
    ("Georgetown", "Scott"),
    ("Florence", "Boone"),
    ("Hopkinsville", "Christian"),
    ("Nicholasville", "Jessamine"),
    ("Elizabethtown", "Hardin"),
    ("Henderson", "Henderson"),
    ("Frankfort", "Franklin"),
    ("Paducah", "McCracken"),
    ("Radcliff", "Hardin"),
    ("Ashland", "Boyd"),
    ("Madisonville", "Hopkins"),
    ("Winchester", "Clark"),
    ("Erlanger", "Kenton"),
    ("Murray", "Calloway"),
    ("Danville", "Boyle"),
    ("Newport", "Campbell"),
    ("Shelbyville", "Shelby"),
    ("Glasgow", "Barren"),
    ("Berea", "Madison"),
    ("Bardstown", "Nelson"),
    ("Shepherdsville", "Bullitt"),
    ("Somerset", "Pulaski"),
    ("Lawrenceburg", "Anderson"),
    ("Middlesboro", "Bell"),
    ("Mayfield", "Graves"),
    ("Mount Washington", "Bullitt"),
    ("Campbellsville", "Taylor"),
    ("Paris", "Bourbon"),
    ("Versailles", "Woodford"),
    ("London", "Laurel"),
    ("Harrodsburg", "Mercer"),
    ("Pikeville", "Pike"),
    ("Hazard", "Perry"),
    ("Morehead", "Rowan"),
    ("Maysville", "Mason"),
    ("Corbin", "Whitley"),
    ("Franklin", "Simpson"),
    ("Fort Thomas", "Campbell"),
    ("Fort Knox", "Hardin"),
];

/// City names shared with prominent places outside Kentucky. These require
/// a corroborating KY signal before they count as relevance evidence.
pub const AMBIGUOUS_CITIES: &[&str] = &[
    "Lexington",
    "Louisville",
    "Georgetown",
    "Franklin",
    "Winchester",
];

/// U.S. state names scanned for the `other_states` disclosure tag.
pub const US_STATES: &[(&str, &str)] = &[
    ("Alabama", "AL"), ("Alaska", "AK"), ("Arizona", "AZ"), ("Arkansas", "AR"),
    ("California", "CA"), ("Colorado", "CO"), ("Connecticut", "CT"), ("Delaware", "DE"),
    ("Florida", "FL"), ("Georgia", "GA"), ("Hawaii", "HI"), ("Idaho", "ID"),
    ("Illinois", "IL"), ("Indiana", "IN"), ("Iowa", "IA"), ("Kansas", "KS"),
    ("Kentucky", "KY"), ("Louisiana", "LA"), ("Maine", "ME"), ("Maryland", "MD"),
    ("Massachusetts", "MA"), ("Michigan", "MI"), ("Minnesota", "MN"), ("Mississippi", "MS"),
    ("Missouri", "MO"), ("Montana", "MT"), ("Nebraska", "NE"), ("Nevada", "NV"),
    ("New Hampshire", "NH"), ("New Jersey", "NJ"), ("New Mexico", "NM"), ("New York", "NY"),
    ("North Carolina", "NC"), ("North Dakota", "ND"), ("Ohio", "OH"), ("Oklahoma", "OK"),
    ("Oregon", "OR"), ("Pennsylvania", "PA"), ("Rhode Island", "RI"), ("South Carolina", "SC"),
    ("South Dakota", "SD"), ("Tennessee", "TN"), ("Texas", "TX"), ("Utah", "UT"),
    ("Vermont", "VT"), ("Virginia", "VA"), ("Washington", "WA"), ("West Virginia", "WV"),
    ("Wisconsin", "WI"), ("Wyoming", "WY"),
];

pub fn is_ambiguous_city(city: &str) -> bool {
    AMBIGUOUS_CITIES
        .iter()
        .any(|c| c.eq_ignore_ascii_case(city))
}

/// Cities safe to use as relevance evidence without corroboration.
pub fn unambiguous_cities() -> impl Iterator<Item = &'static str> {
    KY_CITY_TO_COUNTY
        .iter()
        .map(|(city, _)| *city)
        .filter(|city| !is_ambiguous_city(city))
}

pub fn county_for_city(city: &str) -> Option<&'static str> {
    KY_CITY_TO_COUNTY
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(city))
        .map(|(_, county)| *county)
}
